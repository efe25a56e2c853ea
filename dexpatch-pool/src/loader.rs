//! YAML form of a method pool.
//!
//! ```yaml
//! classes:
//!   - descriptor: Lapp/Main;
//!     super: Ljava/lang/Object;
//!     access: [public]
//!     methods:
//!       - name: isEnabled
//!         returns: Z
//!         access: [public, static]
//!         registers: 1
//!         code:
//!           - const/4 v0, 0x1
//!           - return v0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{AccessFlags, ClassDef, Method, MethodPool};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolDoc {
    #[serde(default)]
    classes: Vec<ClassDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassDoc {
    descriptor: String,
    #[serde(rename = "super", default, skip_serializing_if = "Option::is_none")]
    super_class: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    access: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    interfaces: Vec<String>,
    #[serde(default)]
    methods: Vec<MethodDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MethodDoc {
    name: String,
    #[serde(default = "void")]
    returns: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    access: Vec<String>,
    registers: u16,
    #[serde(default)]
    code: Vec<String>,
}

fn void() -> String {
    "V".to_string()
}

impl MethodPool {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let doc: PoolDoc = serde_yaml::from_str(text)?;
        let classes = doc
            .classes
            .into_iter()
            .map(ClassDoc::into_class)
            .collect::<Result<Vec<_>>>()?;
        let pool = Self::from_classes(classes)?;
        log::debug!(
            "loaded {} classes, {} methods",
            pool.class_count(),
            pool.method_count()
        );
        Ok(pool)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        let doc = PoolDoc {
            classes: self.classes().iter().map(ClassDoc::from_class).collect(),
        };
        Ok(serde_yaml::to_string(&doc)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?).map_err(|e| Error::Io(e.to_string()))
    }
}

impl ClassDoc {
    fn into_class(self) -> Result<ClassDef> {
        let mut class = ClassDef::new(self.descriptor)?
            .with_access(AccessFlags::parse_names(&self.access)?);
        if let Some(s) = self.super_class {
            class = class.with_super(s);
        }
        for interface in self.interfaces {
            class = class.with_interface(interface);
        }
        for m in self.methods {
            let method = Method::new(
                class.descriptor(),
                m.name,
                m.parameters,
                m.returns,
                AccessFlags::parse_names(&m.access)?,
                m.registers,
            )?
            .with_code(&m.code.join("\n"))?;
            class = class.with_method(method);
        }
        Ok(class)
    }

    fn from_class(class: &ClassDef) -> Self {
        Self {
            descriptor: class.descriptor().to_string(),
            super_class: class.super_class().map(str::to_string),
            access: class.access_flags().names(),
            interfaces: class.interfaces().to_vec(),
            methods: class.methods().iter().map(MethodDoc::from_method).collect(),
        }
    }
}

impl MethodDoc {
    fn from_method(method: &Method) -> Self {
        let code = method
            .body()
            .to_items()
            .into_iter()
            .map(|item| match item {
                dexpatch_isa::AsmItem::Label(l) => l.to_string(),
                dexpatch_isa::AsmItem::Instruction(i) => i.to_string(),
            })
            .collect();
        Self {
            name: method.name().to_string(),
            returns: method.return_type().to_string(),
            parameters: method.parameters().to_vec(),
            access: method.access_flags().names(),
            registers: method.registers(),
            code,
        }
    }
}
