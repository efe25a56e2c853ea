//! Decoded methods and their edit journal.

use dexpatch_isa::{MethodRef, RegisterMap, assemble, is_wide_type};

use crate::error::{Error, Result};
use crate::modifiers::AccessFlags;
use crate::stream::{InstructionStream, StreamError};

/// One recorded body edit: at `at`, `removed` instructions were replaced by
/// `inserted` new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub revision: u64,
    pub at: usize,
    pub removed: usize,
    pub inserted: usize,
}

impl Edit {
    /// Whether this edit could have moved or changed anything at or before
    /// `index`.
    pub fn touches_up_to(&self, index: usize) -> bool {
        self.at <= index
    }
}

/// A method with its body. The body can only be changed through a
/// [`Splicer`](crate::Splicer); every change bumps [`Method::revision`].
#[derive(Debug, Clone)]
pub struct Method {
    class: String,
    name: String,
    parameters: Vec<String>,
    return_type: String,
    access_flags: AccessFlags,
    registers: u16,
    body: InstructionStream,
    revision: u64,
    journal: Vec<Edit>,
}

impl Method {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        return_type: impl Into<String>,
        access_flags: AccessFlags,
        registers: u16,
    ) -> Result<Self> {
        let r = MethodRef::new(class, name, parameters, return_type)?;
        Ok(Self {
            class: r.class,
            name: r.name,
            parameters: r.parameters,
            return_type: r.return_type,
            access_flags,
            registers,
            body: InstructionStream::new(),
            revision: 0,
            journal: Vec::new(),
        })
    }

    /// Attach a body assembled from smali text. `pN` registers resolve
    /// against this method's parameter window.
    pub fn with_code(mut self, src: &str) -> Result<Self> {
        let items = assemble(src, &self.register_map())?;
        self.body = InstructionStream::from_items(items).map_err(|e| self.stream_error(e))?;
        Ok(self)
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Size of the register window.
    pub fn registers(&self) -> u16 {
        self.registers
    }

    pub fn body(&self) -> &InstructionStream {
        &self.body
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn journal(&self) -> &[Edit] {
        &self.journal
    }

    /// Edits recorded after `revision`.
    pub fn edits_since(&self, revision: u64) -> impl Iterator<Item = &Edit> + '_ {
        self.journal.iter().filter(move |e| e.revision > revision)
    }

    /// Whether anything at or before `index` may have changed since
    /// `revision`.
    pub fn edited_up_to(&self, revision: u64, index: usize) -> bool {
        self.edits_since(revision).any(|e| e.touches_up_to(index))
    }

    /// `Lcls;->name(params)ret`.
    pub fn reference(&self) -> MethodRef {
        MethodRef {
            class: self.class.clone(),
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            return_type: self.return_type.clone(),
        }
    }

    pub fn signature(&self) -> String {
        self.reference().to_string()
    }

    /// Registers taken by incoming arguments: wide parameters count twice,
    /// instance methods add `this`.
    pub fn parameter_registers(&self) -> u16 {
        let args: u16 = self
            .parameters
            .iter()
            .map(|p| if is_wide_type(p) { 2 } else { 1 })
            .sum();
        args + u16::from(!self.is_static())
    }

    /// First register of the parameter window, if the window fits.
    pub fn param_base(&self) -> Option<u16> {
        self.registers.checked_sub(self.parameter_registers())
    }

    /// The `reserved`-th local register counted down from the parameter
    /// window: `registers - parameter_registers - reserved`.
    pub fn free_register(&self, reserved: u16) -> Result<u16> {
        self.param_base()
            .filter(|_| reserved > 0)
            .and_then(|locals| locals.checked_sub(reserved))
            .ok_or_else(|| Error::NoFreeRegister {
                method: self.signature(),
                reserved,
            })
    }

    pub(crate) fn register_map(&self) -> RegisterMap {
        match self.param_base() {
            Some(base) => RegisterMap::with_param_base(base),
            None => RegisterMap::new(),
        }
    }

    pub(crate) fn set_class(&mut self, class: &str) {
        self.class = class.to_string();
    }

    pub(crate) fn body_mut(&mut self) -> &mut InstructionStream {
        &mut self.body
    }

    pub(crate) fn record(&mut self, at: usize, removed: usize, inserted: usize) {
        self.revision += 1;
        self.journal.push(Edit {
            revision: self.revision,
            at,
            removed,
            inserted,
        });
    }

    pub(crate) fn stream_error(&self, e: StreamError) -> Error {
        let method = self.signature();
        match e {
            StreamError::DuplicateLabel(label) => Error::LabelConflict { method, label },
            StreamError::TrailingLabel(label) => Error::DanglingLabel { method, label },
            StreamError::UnboundLabel(label) => Error::InvalidOperand {
                method,
                reason: format!("branch to unbound label :{label}"),
            },
        }
    }
}
