//! Method and field references in smali notation.

use std::fmt;

use crate::instruction::OperandError;

/// A method reference: `Lcom/example/Foo;->bar(ILjava/lang/String;)V`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: String,
}

/// A field reference: `Lcom/example/Foo;->bar:I`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub field_type: String,
}

impl MethodRef {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        return_type: impl Into<String>,
    ) -> Result<Self, OperandError> {
        let r = Self {
            class: class.into(),
            name: name.into(),
            parameters,
            return_type: return_type.into(),
        };
        r.validate()?;
        Ok(r)
    }

    pub fn parse(s: &str) -> Result<Self, OperandError> {
        let invalid = || OperandError::InvalidReference(s.to_string());
        let (class, rest) = s.split_once("->").ok_or_else(invalid)?;
        let open = rest.find('(').ok_or_else(invalid)?;
        let close = rest.find(')').ok_or_else(invalid)?;
        if close < open {
            return Err(invalid());
        }
        let name = &rest[..open];
        let parameters = parse_type_list(&rest[open + 1..close])?;
        let return_type = &rest[close + 1..];
        Self::new(class, name, parameters, return_type)
    }

    fn validate(&self) -> Result<(), OperandError> {
        if !is_reference_type(&self.class) {
            return Err(OperandError::InvalidDescriptor(self.class.clone()));
        }
        if self.name.is_empty() || self.name.contains(|c: char| "();:".contains(c)) {
            return Err(OperandError::InvalidReference(self.to_string()));
        }
        for p in &self.parameters {
            if !is_field_type(p) {
                return Err(OperandError::InvalidDescriptor(p.clone()));
            }
        }
        if !is_return_type(&self.return_type) {
            return Err(OperandError::InvalidDescriptor(self.return_type.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}({}){}",
            self.class,
            self.name,
            self.parameters.concat(),
            self.return_type
        )
    }
}

impl FieldRef {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Result<Self, OperandError> {
        let r = Self {
            class: class.into(),
            name: name.into(),
            field_type: field_type.into(),
        };
        if !is_reference_type(&r.class) {
            return Err(OperandError::InvalidDescriptor(r.class));
        }
        if !is_field_type(&r.field_type) {
            return Err(OperandError::InvalidDescriptor(r.field_type));
        }
        if r.name.is_empty() || r.name.contains(|c: char| "();:".contains(c)) {
            return Err(OperandError::InvalidReference(r.to_string()));
        }
        Ok(r)
    }

    pub fn parse(s: &str) -> Result<Self, OperandError> {
        let invalid = || OperandError::InvalidReference(s.to_string());
        let (class, rest) = s.split_once("->").ok_or_else(invalid)?;
        let (name, field_type) = rest.split_once(':').ok_or_else(invalid)?;
        Self::new(class, name, field_type)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.field_type)
    }
}

/// Length of the first type descriptor in `s`, if `s` starts with one.
fn descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D' => Some(i + 1),
        b'L' => {
            let end = s[i..].find(';')?;
            // `L;` has no class name
            if end == 1 { None } else { Some(i + end + 1) }
        }
        _ => None,
    }
}

/// Split a concatenated descriptor list such as `ILjava/lang/String;[J`.
pub fn parse_type_list(s: &str) -> Result<Vec<String>, OperandError> {
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let len = descriptor_len(rest)
            .ok_or_else(|| OperandError::InvalidDescriptor(rest.to_string()))?;
        out.push(rest[..len].to_string());
        rest = &rest[len..];
    }
    Ok(out)
}

/// A non-void type descriptor.
pub fn is_field_type(s: &str) -> bool {
    descriptor_len(s) == Some(s.len())
}

/// A field type or `V`.
pub fn is_return_type(s: &str) -> bool {
    s == "V" || is_field_type(s)
}

/// A class or array descriptor.
pub fn is_reference_type(s: &str) -> bool {
    (s.starts_with('L') || s.starts_with('[')) && is_field_type(s)
}

/// `J` and `D` occupy a register pair.
pub fn is_wide_type(s: &str) -> bool {
    s == "J" || s == "D"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_list_splits_mixed_descriptors() {
        let types = parse_type_list("IZLjava/lang/String;[[J").unwrap();
        assert_eq!(types, vec!["I", "Z", "Ljava/lang/String;", "[[J"]);
    }

    #[test]
    fn type_list_rejects_unterminated_class() {
        assert!(parse_type_list("ILjava/lang/String").is_err());
        assert!(parse_type_list("L;").is_err());
        assert!(parse_type_list("V").is_err());
    }

    #[test]
    fn method_ref_display_matches_parse() {
        let s = "Lapp/Feed;->hide(Landroid/view/View;I)V";
        let m = MethodRef::parse(s).unwrap();
        assert_eq!(m.class, "Lapp/Feed;");
        assert_eq!(m.name, "hide");
        assert_eq!(m.parameters, vec!["Landroid/view/View;", "I"]);
        assert_eq!(m.return_type, "V");
        assert_eq!(m.to_string(), s);
    }

    #[test]
    fn method_ref_rejects_primitive_owner() {
        assert!(MethodRef::parse("I->foo()V").is_err());
        assert!(MethodRef::parse("La;->()V").is_err());
        assert!(MethodRef::parse("La;->foo(V)V").is_err());
    }

    #[test]
    fn field_ref_parse() {
        let f = FieldRef::parse("La/B;->count:I").unwrap();
        assert_eq!(f.name, "count");
        assert_eq!(f.field_type, "I");
        assert!(FieldRef::parse("La/B;->count").is_err());
    }
}
