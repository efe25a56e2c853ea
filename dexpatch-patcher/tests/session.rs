mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use dexpatch_pool::ExternalLabel;
use dexpatch_patcher::*;

fn counting(name: &str, counter: &Arc<AtomicUsize>) -> PatchDescriptor {
    let counter = Arc::clone(counter);
    PatchDescriptor::new(name).execute(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn disable_informer() -> PatchDescriptor {
    PatchDescriptor::new("disable-informer")
        .fingerprint(informer(), Uniqueness::Required)
        .execute(|cx| {
            let result = cx.result("start-video-informer")?;
            cx.splicer(&result)?.return_early(None)?;
            Ok(())
        })
}

#[test]
fn return_early_on_the_resolved_method() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::new("com.google.android.youtube"));
    session.register(disable_informer()).unwrap();
    let report = session.run_all().unwrap();
    assert_eq!(report.executed, ["disable-informer"]);

    let pool = session.into_pool();
    assert_eq!(text(&pool, "Lapp/Informer;", "start")[0], "return-void");
    assert_eq!(text(&pool, "Lapp/Informer;", "decoy")[0], "const-string v0, \"ad\"");
}

#[test]
fn patches_may_reuse_a_fingerprint_name() {
    let targeting = |patch: &str, string: &str, expected: &'static str| {
        PatchDescriptor::new(patch)
            .fingerprint(Fingerprint::new("target").strings([string]), Uniqueness::Required)
            .execute(move |cx| {
                assert_eq!(cx.result("target")?.signature, expected);
                Ok(())
            })
    };
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session.register(targeting("a", "pc", "Lapp/Informer;->start()V")).unwrap();
    session.register(targeting("b", "pd", "Lapp/Informer;->decoy()V")).unwrap();
    let report = session.run_all().unwrap();
    assert_eq!(report.executed, ["a", "b"]);
}

#[test]
fn three_cycle_runs_nothing() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session.register(counting("a", &counter).depends_on("b")).unwrap();
    session.register(counting("b", &counter).depends_on("c")).unwrap();
    session.register(counting("c", &counter).depends_on("a")).unwrap();
    session.register(disable_informer()).unwrap();

    let err = session.run_all().unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { ref cycle } if cycle == &["a", "b", "c", "a"]));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!session.is_executed("disable-informer"));
    assert!(session.pool().methods().all(|(_, _, m)| m.revision() == 0));
}

#[test]
fn shared_dependency_executes_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session.register(PatchDescriptor::new("hide-ads").depends_on("integrations")).unwrap();
    session.register(PatchDescriptor::new("hide-shorts").depends_on("integrations")).unwrap();
    session.register(counting("integrations", &counter)).unwrap();

    let report = session.run_all().unwrap();
    assert_eq!(report.executed, ["integrations", "hide-ads", "hide-shorts"]);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let again = session.run(&["hide-ads"]).unwrap();
    assert!(again.executed.is_empty());
    assert_eq!(again.skipped, ["integrations", "hide-ads"]);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn failure_names_the_patch() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session
        .register(
            PatchDescriptor::new("spoof-client")
                .fingerprint(Fingerprint::new("player-request").strings(["x-goog-api"]), Uniqueness::Required),
        )
        .unwrap();
    let err = session.run(&["spoof-client"]).unwrap_err();
    match &err {
        Error::Patch { patch, .. } => assert_eq!(patch, "spoof-client"),
        other => panic!("expected a patch failure, got {other:?}"),
    }
    assert!(matches!(err.root(), Error::NotFound { fingerprint } if fingerprint == "player-request"));
    assert!(err.to_string().contains("spoof-client"));
}

#[test]
fn ambiguity_is_fatal() {
    let mut session = PatchSession::new(pool(PLAYER), AppContext::default());
    session
        .register(PatchDescriptor::new("opus").fingerprint(codec_select(), Uniqueness::Required))
        .unwrap();
    let err = session.run_all().unwrap_err();
    assert!(matches!(err.root(), Error::Ambiguous { candidates, .. } if candidates.len() == 2));
}

#[test]
fn optional_fingerprint_may_be_absent() {
    let seen = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&seen);
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session
        .register(
            PatchDescriptor::new("legacy")
                .optional_fingerprint(Fingerprint::new("old-layout").strings(["gone"]))
                .execute(move |cx| {
                    if cx.optional_result("old-layout")?.is_none() {
                        witness.fetch_add(1, Ordering::SeqCst);
                    }
                    assert!(matches!(cx.result("old-layout"), Err(Error::NotFound { .. })));
                    assert!(matches!(cx.result("undeclared"), Err(Error::UnknownFingerprint(_))));
                    Ok(())
                }),
        )
        .unwrap();
    session.run_all().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn options_are_checked_before_anything_runs() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session.register(counting("integrations", &counter)).unwrap();
    session
        .register(
            PatchDescriptor::new("gms-support")
                .depends_on("integrations")
                .option(OptionSpec::string("vendor-group-id", None).required()),
        )
        .unwrap();

    let err = session.run_all().unwrap_err();
    assert!(matches!(err.root(), Error::MissingOption { key, .. } if key == "vendor-group-id"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let mut values = OptionValues::new();
    values.set("gms-support", "vendor-group-id", "app.revanced");
    session.set_options(values);
    session.run_all().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn incompatible_package_is_refused() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::new("com.google.android.apps.youtube.music"));
    session
        .register(disable_informer().compatible_with("com.google.android.youtube"))
        .unwrap();
    let err = session.run_all().unwrap_err();
    assert!(matches!(err.root(), Error::Incompatible { package, .. } if package == "com.google.android.apps.youtube.music"));
    assert!(!session.is_executed("disable-informer"));
}

/// Prefer opus over mp4a when the integration says so, falling through to
/// the original code otherwise.
fn opus_codec() -> PatchDescriptor {
    PatchDescriptor::new("opus-codec")
        .option(OptionSpec::bool("enabled", true))
        .fingerprint(Fingerprint::new("codec-mime").strings(["audio/mp4a-latm"]), Uniqueness::Required)
        .execute(|cx| {
            if !cx.option_bool("enabled")? {
                return Ok(());
            }
            let result = cx.result("codec-mime")?;
            let at = result.string_index("audio/mp4a-latm").unwrap_or(0);
            cx.splicer(&result)?.insert_asm_with_labels(
                at,
                "
                invoke-static {}, Lapp/Integrations;->useOpus()Z
                move-result v1
                if-eqz v1, :mp4a
                const-string v0, \"audio/opus\"
                return-object v0
                ",
                &[ExternalLabel::new("mp4a", at)],
            )?;
            Ok(())
        })
}

#[test]
fn snippet_branches_back_into_original_code() {
    let mut session = PatchSession::new(pool(PLAYER), AppContext::default());
    session.register(opus_codec()).unwrap();
    session.run_all().unwrap();

    let pool = session.into_pool();
    let method = pool.method(key(&pool, "Lapp/Codec;", "mime")).unwrap();
    assert_eq!(method.body().len(), 8);
    assert_eq!(method.body().branch_target(2), Some(5));
    assert_eq!(method.body().get(5).unwrap().string(), Some("audio/mp4a-latm"));
    assert_eq!(method.body().get(3).unwrap().string(), Some("audio/opus"));
}

#[test]
fn disabled_option_leaves_the_method_alone() {
    let mut session = PatchSession::new(pool(PLAYER), AppContext::default());
    session.register(opus_codec()).unwrap();
    let mut values = OptionValues::new();
    values.set("opus-codec", "enabled", false);
    session.set_options(values);
    session.run_all().unwrap();
    assert_eq!(text(session.pool(), "Lapp/Codec;", "mime").len(), 3);
}

#[test]
fn version_gates_come_from_the_app_context() {
    let app = AppContext::new("com.google.android.youtube").with_version("19.16.39").unwrap();
    let mut session = PatchSession::new(pool(INFORMER), app);
    session
        .register(disable_informer().execute(|cx| {
            if cx.app().is_at_least("19.20")? {
                let result = cx.result("start-video-informer")?;
                cx.splicer(&result)?.return_early(None)?;
            }
            Ok(())
        }))
        .unwrap();
    session.run_all().unwrap();
    assert_eq!(text(session.pool(), "Lapp/Informer;", "start")[0], "const-string v0, \"pc\"");
}

#[test]
fn later_patch_sees_earlier_edits() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session
        .register(PatchDescriptor::new("prefix").fingerprint(informer(), Uniqueness::Required).execute(|cx| {
            let result = cx.result("start-video-informer")?;
            cx.splicer(&result)?.insert_asm(0, "nop")?;
            Ok(())
        }))
        .unwrap();
    session
        .register(
            PatchDescriptor::new("after")
                .depends_on("prefix")
                .fingerprint(informer(), Uniqueness::Required)
                .execute(|cx| {
                    let result = cx.result("start-video-informer")?;
                    assert_eq!(result.pattern_start(), Some(3));
                    Ok(())
                }),
        )
        .unwrap();
    session.run(&["after"]).unwrap();
    assert_eq!(session.scanner().scans(), 2);
}

#[test]
fn transform_rewrites_matching_constants() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session
        .register(PatchDescriptor::new("rename").execute(|cx| {
            let n = cx.transform_strings(|s| (s.len() == 2).then(|| s.to_uppercase()))?;
            assert_eq!(n, 3);
            Ok(())
        }))
        .unwrap();
    session.run_all().unwrap();
    let pool = session.into_pool();
    assert_eq!(text(&pool, "Lapp/Informer;", "start")[0], "const-string v0, \"PC\"");
    assert_eq!(text(&pool, "Lapp/Informer;", "decoy")[1], "const-string v0, \"PD\"");

    let mut pool = pool;
    assert_eq!(transform_strings(&mut pool, |_| None).unwrap(), 0);
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut session = PatchSession::new(pool(INFORMER), AppContext::default());
    session.register(disable_informer()).unwrap();
    assert!(matches!(session.register(disable_informer()), Err(Error::DuplicatePatch(_))));
    assert!(matches!(session.run(&["nope"]), Err(Error::UnknownPatch(_))));
}
