#![allow(dead_code)]

use dexpatch_isa::Opcode;
use dexpatch_patcher::*;
use dexpatch_pool::{AccessFlags, MethodKey, MethodPool};

/// `Lapp/Informer;->start()V` loads `"pc"` and ends in
/// `invoke-interface, return-void`. `decoy` has the same shape and flags
/// but two other string constants.
pub const INFORMER: &str = r#"
classes:
  - descriptor: Lapp/Informer;
    access: [public, final]
    methods:
      - name: start
        access: [public, final]
        registers: 2
        code:
          - const-string v0, "pc"
          - const/4 v0, 0x0
          - invoke-interface {p0}, Lapp/Tracker;->start()V
          - return-void
      - name: decoy
        access: [public, final]
        registers: 2
        code:
          - const-string v0, "ad"
          - const-string v0, "pd"
          - invoke-interface {p0}, Lapp/Tracker;->start()V
          - return-void
"#;

/// `Lapp/Player;->play()V` calls `Lapp/Codec;->select()Z`; an unrelated
/// class has a method of identical shape.
pub const PLAYER: &str = r#"
classes:
  - descriptor: Lapp/Player;
    methods:
      - name: play
        access: [public]
        registers: 2
        code:
          - const-string v0, "playback"
          - invoke-static {}, Lapp/Codec;->select()Z
          - move-result v0
          - return-void
  - descriptor: Lapp/Other;
    methods:
      - name: select
        returns: Z
        access: [public, static]
        registers: 1
        code:
          - const/4 v0, 0x1
          - return v0
  - descriptor: Lapp/Codec;
    methods:
      - name: select
        returns: Z
        access: [public, static]
        registers: 1
        code:
          - const/4 v0, 0x1
          - return v0
      - name: mime
        returns: Ljava/lang/String;
        access: [public, static]
        registers: 2
        code:
          - const-string v0, "audio/mp4a-latm"
          - invoke-static {v0}, Lapp/Log;->d(Ljava/lang/String;)V
          - return-object v0
"#;

pub fn pool(yaml: &str) -> MethodPool {
    MethodPool::from_yaml(yaml).unwrap()
}

pub fn informer() -> Fingerprint {
    Fingerprint::new("start-video-informer")
        .returns("V")
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .strings(["pc"])
        .opcodes([Opcode::InvokeInterface, Opcode::ReturnVoid])
}

pub fn codec_select() -> Fingerprint {
    Fingerprint::new("codec-select")
        .returns("Z")
        .opcodes([Opcode::Const4, Opcode::Return])
}

pub fn key(pool: &MethodPool, class: &str, name: &str) -> MethodKey {
    pool.methods()
        .find(|(_, c, m)| c.descriptor() == class && m.name() == name)
        .map(|(key, _, _)| key)
        .unwrap()
}

pub fn text(pool: &MethodPool, class: &str, name: &str) -> Vec<String> {
    let method = pool.method(key(pool, class, name)).unwrap();
    method.body().iter().map(ToString::to_string).collect()
}
