use dexpatch_pool::*;

/// A static `()V` method on `Lapp/Fixture;` with the given body.
pub fn method(registers: u16, code: &str) -> Method {
    Method::new("Lapp/Fixture;", "run", vec![], "V", AccessFlags::STATIC, registers)
        .unwrap()
        .with_code(code)
        .unwrap()
}

/// Ten instructions; `:target` is bound at 5 and referenced by the branch
/// at 3.
pub fn ten() -> Method {
    method(
        3,
        "
        const/4 v0, 0x0
        const/4 v1, 0x1
        add-int/2addr v0, v1
        if-eqz v0, :target
        nop
        :target
        const/4 v2, 0x2
        nop
        nop
        nop
        return-void
        ",
    )
}

pub fn text(m: &Method) -> Vec<String> {
    m.body().iter().map(ToString::to_string).collect()
}
