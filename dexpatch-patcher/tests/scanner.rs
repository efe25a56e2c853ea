mod common;

use common::*;
use dexpatch_isa::Opcode;
use dexpatch_patcher::*;
use dexpatch_pool::{ClassDef, Method, MethodPool};

#[test]
fn informer_resolves_to_the_single_string_method() {
    let pool = pool(INFORMER);
    let result = Scanner::new()
        .resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required)
        .unwrap();
    assert_eq!(result.signature, "Lapp/Informer;->start()V");
    assert_eq!(result.pattern(), Some(PatternMatch { start: 2, end: 3 }));
    assert_eq!(result.string_index("pc"), Some(0));
    assert_eq!(result.class, "Lapp/Informer;");
}

#[test]
fn opcodes_alone_are_ambiguous() {
    let pool = pool(INFORMER);
    let shape = Fingerprint::new("shape").opcodes([Opcode::InvokeInterface, Opcode::ReturnVoid]);
    match scan(&pool, &shape, &Scope::Pool, Uniqueness::Required) {
        Err(Error::Ambiguous { candidates, .. }) => assert_eq!(
            candidates,
            ["Lapp/Informer;->start()V", "Lapp/Informer;->decoy()V"]
        ),
        other => panic!("expected ambiguity, got {other:?}"),
    }
    let first = scan(&pool, &shape, &Scope::Pool, Uniqueness::First).unwrap();
    assert_eq!(first.signature, "Lapp/Informer;->start()V");
}

#[test]
fn missing_fingerprint() {
    let pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let fp = Fingerprint::new("absent").strings(["no such string"]);
    assert!(matches!(
        scanner.resolve(&pool, &fp, &Scope::Pool, Uniqueness::Required),
        Err(Error::NotFound { ref fingerprint }) if fingerprint == "absent"
    ));
    assert_eq!(scanner.try_resolve(&pool, &fp, &Scope::Pool, Uniqueness::Required).unwrap(), None);
}

#[test]
fn resolve_is_idempotent_and_memoized() {
    let pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let a = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();
    let b = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(a, b);
    assert_eq!(scanner.scans(), 1);
    assert!(a.is_current(&pool));
}

#[test]
fn same_name_different_definition_is_a_different_entry() {
    let pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let a = Fingerprint::new("target").strings(["pc"]);
    let b = Fingerprint::new("target").strings(["pd"]);
    let first = scanner.resolve(&pool, &a, &Scope::Pool, Uniqueness::Required).unwrap();
    let second = scanner.resolve(&pool, &b, &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(first.signature, "Lapp/Informer;->start()V");
    assert_eq!(second.signature, "Lapp/Informer;->decoy()V");
    assert_eq!(scanner.scans(), 2);

    // distinct closures never share a result; clones of one do
    let any = |_: &Method, _: &ClassDef| true;
    let c = a.clone().custom(any);
    let d = a.clone().custom(any);
    scanner.resolve(&pool, &c, &Scope::Pool, Uniqueness::Required).unwrap();
    scanner.resolve(&pool, &c.clone(), &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(scanner.scans(), 3);
    scanner.resolve(&pool, &d, &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(scanner.scans(), 4);

    scanner.invalidate("target");
    scanner.resolve(&pool, &b, &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(scanner.scans(), 5);
}

#[test]
fn edit_before_the_match_forces_a_rescan() {
    let mut pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let before = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();

    pool.splicer(before.method).unwrap().insert_asm(0, "nop").unwrap();
    assert!(!before.is_current(&pool));

    let after = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(scanner.scans(), 2);
    assert_eq!(after.pattern(), Some(PatternMatch { start: 3, end: 4 }));
    assert_eq!(after.string_index("pc"), Some(1));
}

#[test]
fn edit_past_the_anchors_keeps_the_result() {
    let mut pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let fp = Fingerprint::new("pc").strings(["pc"]);
    let result = scanner.resolve(&pool, &fp, &Scope::Pool, Uniqueness::Required).unwrap();

    pool.splicer(result.method).unwrap().insert_asm(2, "nop").unwrap();
    assert!(result.is_current(&pool));
    scanner.resolve(&pool, &fp, &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(scanner.scans(), 1);
}

#[test]
fn shape_change_invalidates() {
    let mut pool = pool(INFORMER);
    let mut scanner = Scanner::new();
    let result = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();
    pool.add_class(ClassDef::new("Lapp/Added;").unwrap()).unwrap();
    assert!(!result.is_current(&pool));
    assert!(matches!(pool.method(result.method), Err(dexpatch_pool::Error::StaleKey { .. })));

    let again = scanner.resolve(&pool, &informer(), &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(again.signature, result.signature);
    assert_eq!(scanner.scans(), 2);
}

#[test]
fn scoped_resolution_narrows_to_the_neighborhood() {
    let pool = pool(PLAYER);
    let mut scanner = Scanner::new();
    assert!(matches!(
        scanner.resolve(&pool, &codec_select(), &Scope::Pool, Uniqueness::Required),
        Err(Error::Ambiguous { .. })
    ));

    // phase 1: the method that provides the scope
    let play = Fingerprint::new("play").strings(["playback"]);
    let play = scanner.resolve(&pool, &play, &Scope::Pool, Uniqueness::Required).unwrap();
    let scope = Scope::neighborhood(&pool, &play).unwrap();
    assert!(scope.contains("Lapp/Codec;"));
    assert!(!scope.contains("Lapp/Other;"));

    // phase 2: the scoped fingerprint
    let select = scanner
        .resolve(&pool, &codec_select(), &scope, Uniqueness::Required)
        .unwrap();
    assert_eq!(select.signature, "Lapp/Codec;->select()Z");

    let by_class = scanner
        .resolve(&pool, &codec_select(), &Scope::class("Lapp/Other;"), Uniqueness::Required)
        .unwrap();
    assert_eq!(by_class.signature, "Lapp/Other;->select()Z");
}

#[test]
fn resolve_many_keeps_request_order() {
    let pool = pool(PLAYER);
    let mut scanner = Scanner::new();
    let mime = Fingerprint::new("mime").strings(["audio/mp4a-latm"]);
    let missing = Fingerprint::new("missing").literal(42);
    let select = codec_select();
    let results = scanner.resolve_many(
        &pool,
        &[
            Request::new(&mime, Uniqueness::Required),
            Request::new(&missing, Uniqueness::Required),
            Request::new(&select, Uniqueness::First),
        ],
    );
    assert_eq!(results[0].as_ref().unwrap().signature, "Lapp/Codec;->mime()Ljava/lang/String;");
    assert!(matches!(results[1], Err(Error::NotFound { .. })));
    assert_eq!(results[2].as_ref().unwrap().signature, "Lapp/Other;->select()Z");
    assert_eq!(scanner.scans(), 3);

    // cached entries are not scanned again
    scanner.resolve_many(&pool, &[Request::new(&mime, Uniqueness::Required)]);
    assert_eq!(scanner.scans(), 3);
}

#[test]
fn custom_predicate_runs_last() {
    let pool = pool(PLAYER);
    let fp = codec_select().custom(|_, class| class.descriptor() == "Lapp/Codec;");
    let result = scan(&pool, &fp, &Scope::Pool, Uniqueness::Required).unwrap();
    assert_eq!(result.class, "Lapp/Codec;");
    assert!(!matches(&fp, pool.class("Lapp/Other;").unwrap().method("select").unwrap(), pool.class("Lapp/Other;").unwrap()));
}

#[test]
fn empty_pool_finds_nothing() {
    let pool = MethodPool::new();
    assert!(matches!(
        scan(&pool, &informer(), &Scope::Pool, Uniqueness::First),
        Err(Error::NotFound { .. })
    ));
}
