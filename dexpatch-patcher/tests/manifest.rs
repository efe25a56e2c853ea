mod common;

use common::*;
use dexpatch_patcher::*;

const INFORMER_PATCHES: &str = r#"
app:
  package: com.google.android.youtube
  version: 19.16.39
options:
  disable-informer:
    enabled: true
patches:
  - name: disable-informer
    compatible: [com.google.android.youtube]
    options:
      - { key: enabled, kind: bool, default: false }
    fingerprints:
      - name: start-video-informer
        returns: V
        access: [public, final]
        strings: [pc]
        opcodes: [invoke-interface, return-void]
    actions:
      - action: return-early
        fingerprint: start-video-informer
        when: enabled
"#;

fn session(manifest: &str, pool_yaml: &str) -> PatchSession {
    let manifest = Manifest::from_yaml(manifest).unwrap();
    let mut session = PatchSession::new(pool(pool_yaml), manifest.app_context().unwrap());
    session.set_options(manifest.options.clone());
    for patch in manifest.into_descriptors().unwrap() {
        session.register(patch).unwrap();
    }
    session
}

#[test]
fn manifest_patch_runs_like_a_built_one() {
    let mut session = session(INFORMER_PATCHES, INFORMER);
    assert_eq!(session.app().package, "com.google.android.youtube");
    assert!(session.app().is_at_least("19.16").unwrap());

    session.run_all().unwrap();
    assert_eq!(text(session.pool(), "Lapp/Informer;", "start")[0], "return-void");
}

#[test]
fn gated_action_is_skipped_when_off() {
    let manifest = INFORMER_PATCHES.replace("enabled: true", "enabled: false");
    let mut session = session(&manifest, INFORMER);
    session.run_all().unwrap();
    assert_eq!(text(session.pool(), "Lapp/Informer;", "start").len(), 4);
    assert!(session.is_executed("disable-informer"));
}

#[test]
fn insert_after_the_pattern_with_placeholders() {
    let manifest = r#"
patches:
  - name: hook-codec
    fingerprints:
      - name: play
        strings: [playback]
        opcodes: [invoke-static, move-result]
    actions:
      - action: insert
        fingerprint: play
        at: pattern-end
        offset: 1
        code:
          - invoke-static {{reg}}, Lapp/Hooks;->onCodec(Z)Z
          - move-result {reg}
          - if-nez {reg}, :end
          - const/4 {free}, 0x0
        labels:
          end: { at: last }
"#;
    let mut session = session(manifest, PLAYER);
    session.run_all().unwrap();

    let pool = session.into_pool();
    let play = text(&pool, "Lapp/Player;", "play");
    assert_eq!(play.len(), 8);
    assert_eq!(play[3], "invoke-static {v0}, Lapp/Hooks;->onCodec(Z)Z");
    assert_eq!(play[4], "move-result v0");
    // play is an instance method with two registers, so v1 is `this`
    assert_eq!(play[6], "const/4 v0, 0x0");
    let method = pool.method(key(&pool, "Lapp/Player;", "play")).unwrap();
    assert_eq!(method.body().branch_target(5), Some(7));
    assert_eq!(play[7], "return-void");
}

#[test]
fn replace_and_remove() {
    let manifest = r#"
patches:
  - name: force-opus
    fingerprints:
      - { name: mime, strings: [audio/mp4a-latm] }
    actions:
      - action: remove
        fingerprint: mime
        at: { index: 1 }
      - action: replace
        fingerprint: mime
        at: { string: audio/mp4a-latm }
        code: ['const-string v0, "audio/opus"']
"#;
    let mut session = session(manifest, PLAYER);
    session.run_all().unwrap();
    assert_eq!(
        text(session.pool(), "Lapp/Codec;", "mime"),
        ["const-string v0, \"audio/opus\"", "return-object v0"]
    );
}

const ERASE_THEN_INSERT: &str = r#"
patches:
  - name: erase
    fingerprints:
      - { name: informer, strings: [pc] }
    actions:
      - { action: remove, fingerprint: informer, at: { string: pc } }
      - { action: insert, fingerprint: informer, at: first, code: [nop] }
"#;

#[test]
fn required_fingerprint_lost_mid_patch_fails_the_run() {
    let mut session = session(ERASE_THEN_INSERT, INFORMER);
    let err = session.run_all().unwrap_err();
    assert!(matches!(err.root(), Error::NotFound { fingerprint } if fingerprint == "informer"));
    assert!(!session.is_executed("erase"));
    // the first action stays applied
    assert_eq!(text(session.pool(), "Lapp/Informer;", "start")[0], "const/4 v0, 0x0");
}

#[test]
fn optional_fingerprint_lost_mid_patch_skips_the_rest() {
    let manifest = ERASE_THEN_INSERT.replace("strings: [pc] }", "strings: [pc], optional: true }");
    let mut session = session(&manifest, INFORMER);
    session.run_all().unwrap();
    assert_eq!(
        text(session.pool(), "Lapp/Informer;", "start"),
        [
            "const/4 v0, 0x0",
            "invoke-interface {v1}, Lapp/Tracker;->start()V",
            "return-void"
        ]
    );
}

#[test]
fn rewrite_strings_across_the_pool() {
    let manifest = r#"
patches:
  - name: rename
    actions:
      - action: rewrite-strings
        strings:
          pc: mobile
          playback: replay
"#;
    let mut session = session(manifest, INFORMER);
    session.run_all().unwrap();
    assert_eq!(text(session.pool(), "Lapp/Informer;", "start")[0], "const-string v0, \"mobile\"");
    assert_eq!(text(session.pool(), "Lapp/Informer;", "decoy")[0], "const-string v0, \"ad\"");
}

#[test]
fn unresolvable_anchor_names_the_fingerprint() {
    let manifest = r#"
patches:
  - name: p
    fingerprints:
      - { name: start, strings: [pc] }
    actions:
      - { action: insert, fingerprint: start, at: pattern-end, code: [nop] }
"#;
    let mut session = session(manifest, INFORMER);
    let err = session.run_all().unwrap_err();
    assert!(matches!(err.root(), Error::Anchor { fingerprint, .. } if fingerprint == "start"));
}

#[test]
fn dependencies_and_compatibility_come_through() {
    let manifest = Manifest::from_yaml(
        "patches:
  - { name: a, dependencies: [b], compatible: [com.example] }
  - { name: b }
",
    )
    .unwrap();
    assert!(manifest.app_context().unwrap().package.is_empty());
    let patches = manifest.into_descriptors().unwrap();
    assert_eq!(patches[0].dependencies(), ["b"]);
    assert!(!patches[0].is_compatible_with("com.other"));
    assert!(patches[1].is_compatible_with("com.other"));
}
