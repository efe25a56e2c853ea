//! Class definitions.

use dexpatch_isa::{OperandError, is_reference_type};

use crate::error::Result;
use crate::method::Method;
use crate::modifiers::AccessFlags;

/// A class and the methods it defines.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub(crate) descriptor: String,
    super_class: Option<String>,
    access_flags: AccessFlags,
    interfaces: Vec<String>,
    pub(crate) methods: Vec<Method>,
}

impl ClassDef {
    pub fn new(descriptor: impl Into<String>) -> Result<Self> {
        let descriptor = descriptor.into();
        if !descriptor.starts_with('L') || !is_reference_type(&descriptor) {
            return Err(OperandError::InvalidDescriptor(descriptor).into());
        }
        Ok(Self {
            descriptor,
            super_class: None,
            access_flags: AccessFlags::empty(),
            interfaces: Vec::new(),
            methods: Vec::new(),
        })
    }

    pub fn with_super(mut self, super_class: impl Into<String>) -> Self {
        self.super_class = Some(super_class.into());
        self
    }

    pub fn with_access(mut self, flags: AccessFlags) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Add a method, re-homing it into this class.
    pub fn with_method(mut self, mut method: Method) -> Self {
        method.set_class(&self.descriptor);
        self.methods.push(method);
        self
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn super_class(&self) -> Option<&str> {
        self.super_class.as_deref()
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// First method called `name`.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Index of the method matching name and prototype exactly.
    pub fn find_method(&self, name: &str, parameters: &[String], return_type: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            m.name() == name && m.parameters() == parameters && m.return_type() == return_type
        })
    }
}
