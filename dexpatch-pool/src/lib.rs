//! Decoded method pool for the patching engine.
//!
//! A [`MethodPool`] owns every class of one application. Method bodies are
//! read through [`Method::body`] and changed only through a [`Splicer`].
//! Shape changes (classes or methods added or removed) bump the pool
//! [`generation`](MethodPool::generation), which invalidates every
//! [`MethodKey`] handed out before.

pub mod class;
pub mod error;
pub mod loader;
pub mod method;
pub mod modifiers;
pub mod splice;
pub mod stream;

use std::collections::HashMap;

use dexpatch_isa::MethodRef;
use rayon::prelude::*;

pub use class::ClassDef;
pub use error::{Error, Result};
pub use method::{Edit, Method};
pub use modifiers::AccessFlags;
pub use splice::{ExternalLabel, Splicer};
pub use stream::InstructionStream;

/// Handle to one method, valid for the pool generation it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    generation: u64,
    class: usize,
    method: usize,
}

impl MethodKey {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn class_index(&self) -> usize {
        self.class
    }

    pub fn method_index(&self) -> usize {
        self.method
    }
}

/// All classes of one application, in definition order.
#[derive(Debug, Clone, Default)]
pub struct MethodPool {
    classes: Vec<ClassDef>,
    index: HashMap<String, usize>,
    generation: u64,
}

impl MethodPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_classes(classes: impl IntoIterator<Item = ClassDef>) -> Result<Self> {
        let mut pool = Self::new();
        for class in classes {
            pool.add_class(class)?;
        }
        pool.generation = 0;
        Ok(pool)
    }

    /// Bumped on every shape change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn class(&self, descriptor: &str) -> Option<&ClassDef> {
        self.index.get(descriptor).map(|&i| &self.classes[i])
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods().len()).sum()
    }

    pub fn add_class(&mut self, class: ClassDef) -> Result<()> {
        if self.index.contains_key(class.descriptor()) {
            return Err(Error::DuplicateClass(class.descriptor().to_string()));
        }
        self.index.insert(class.descriptor().to_string(), self.classes.len());
        self.classes.push(class);
        self.generation += 1;
        Ok(())
    }

    pub fn remove_class(&mut self, descriptor: &str) -> Result<ClassDef> {
        let i = self
            .index
            .remove(descriptor)
            .ok_or_else(|| Error::UnknownClass(descriptor.to_string()))?;
        let class = self.classes.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        self.generation += 1;
        Ok(class)
    }

    /// Add `method` to an existing class and return its key.
    pub fn add_method(&mut self, descriptor: &str, mut method: Method) -> Result<MethodKey> {
        let class = *self
            .index
            .get(descriptor)
            .ok_or_else(|| Error::UnknownClass(descriptor.to_string()))?;
        method.set_class(descriptor);
        let methods = &mut self.classes[class].methods;
        methods.push(method);
        let slot = methods.len() - 1;
        self.generation += 1;
        Ok(self.key(class, slot))
    }

    pub fn remove_method(&mut self, key: MethodKey) -> Result<Method> {
        self.check_key(key)?;
        let method = self.classes[key.class].methods.remove(key.method);
        self.generation += 1;
        Ok(method)
    }

    pub fn method(&self, key: MethodKey) -> Result<&Method> {
        self.check_key(key)?;
        Ok(&self.classes[key.class].methods[key.method])
    }

    pub fn class_of(&self, key: MethodKey) -> Result<&ClassDef> {
        self.check_key(key)?;
        Ok(&self.classes[key.class])
    }

    /// Every method with its key and defining class, in pool order.
    pub fn methods(&self) -> impl Iterator<Item = (MethodKey, &ClassDef, &Method)> + '_ {
        self.classes.iter().enumerate().flat_map(move |(ci, class)| {
            class
                .methods()
                .iter()
                .enumerate()
                .map(move |(mi, m)| (self.key(ci, mi), class, m))
        })
    }

    /// Methods of one class.
    pub fn methods_of(&self, descriptor: &str) -> impl Iterator<Item = (MethodKey, &ClassDef, &Method)> + '_ {
        let ci = self.index.get(descriptor).copied();
        ci.into_iter().flat_map(move |ci| {
            let class = &self.classes[ci];
            class
                .methods()
                .iter()
                .enumerate()
                .map(move |(mi, m)| (self.key(ci, mi), class, m))
        })
    }

    /// Resolve an invoke target to a method defined in the pool, walking up
    /// the super-class chain for inherited methods.
    pub fn find_method(&self, target: &MethodRef) -> Option<MethodKey> {
        let mut descriptor = Some(target.class.as_str());
        while let Some(d) = descriptor {
            let ci = *self.index.get(d)?;
            let class = &self.classes[ci];
            if let Some(mi) = class.find_method(&target.name, &target.parameters, &target.return_type) {
                return Some(self.key(ci, mi));
            }
            descriptor = class.super_class();
        }
        None
    }

    /// Exclusive edit access to one method.
    pub fn splicer(&mut self, key: MethodKey) -> Result<Splicer<'_>> {
        self.check_key(key)?;
        Ok(Splicer::new(&mut self.classes[key.class].methods[key.method]))
    }

    /// Run `f` over every method in parallel, partitioned by class. `f`
    /// receives the defining class descriptor. Blocks until every
    /// partition has finished or one of them failed.
    pub fn par_for_each_method_mut<F, E>(&mut self, f: F) -> std::result::Result<(), E>
    where
        F: Fn(&str, Splicer<'_>) -> std::result::Result<(), E> + Send + Sync,
        E: Send,
    {
        self.classes.par_iter_mut().try_for_each(|class| {
            let ClassDef {
                descriptor,
                methods,
                ..
            } = class;
            methods
                .iter_mut()
                .try_for_each(|method| f(descriptor.as_str(), Splicer::new(method)))
        })
    }

    fn key(&self, class: usize, method: usize) -> MethodKey {
        MethodKey {
            generation: self.generation,
            class,
            method,
        }
    }

    fn check_key(&self, key: MethodKey) -> Result<()> {
        let in_range = self
            .classes
            .get(key.class)
            .is_some_and(|c| key.method < c.methods.len());
        if key.generation != self.generation || !in_range {
            return Err(Error::StaleKey {
                key: key.generation,
                pool: self.generation,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(descriptor: &str, super_class: &str, methods: &[&str]) -> ClassDef {
        methods.iter().fold(
            ClassDef::new(descriptor).unwrap().with_super(super_class),
            |c, name| {
                c.with_method(
                    Method::new(descriptor, *name, vec![], "V", AccessFlags::PUBLIC, 1)
                        .unwrap()
                        .with_code("return-void")
                        .unwrap(),
                )
            },
        )
    }

    fn pool() -> MethodPool {
        MethodPool::from_classes([
            class("Lapp/Base;", "Ljava/lang/Object;", &["onStart", "onStop"]),
            class("Lapp/Main;", "Lapp/Base;", &["onCreate"]),
        ])
        .unwrap()
    }

    #[test]
    fn find_method_walks_super_chain() {
        let pool = pool();
        let target = MethodRef::parse("Lapp/Main;->onStop()V").unwrap();
        let key = pool.find_method(&target).unwrap();
        assert_eq!(pool.class_of(key).unwrap().descriptor(), "Lapp/Base;");
        assert!(pool.find_method(&MethodRef::parse("Lapp/Main;->gone()V").unwrap()).is_none());
    }

    #[test]
    fn shape_change_invalidates_keys() {
        let mut pool = pool();
        let (key, _, _) = pool.methods().next().unwrap();
        assert!(pool.method(key).is_ok());
        pool.remove_class("Lapp/Main;").unwrap();
        assert!(matches!(pool.method(key), Err(Error::StaleKey { .. })));
        assert_eq!(pool.generation(), 1);
    }

    #[test]
    fn splicing_keeps_generation() {
        let mut pool = pool();
        let (key, _, _) = pool.methods().next().unwrap();
        pool.splicer(key).unwrap().insert_asm(0, "nop").unwrap();
        assert_eq!(pool.generation(), 0);
        assert_eq!(pool.method(key).unwrap().revision(), 1);
    }

    #[test]
    fn parallel_visit_reaches_every_method() {
        let mut pool = pool();
        pool.par_for_each_method_mut(|_, mut s| s.insert_asm(0, "nop"))
            .unwrap();
        assert!(pool.methods().all(|(_, _, m)| m.body().len() == 2));
    }

    #[test]
    fn duplicate_class_rejected() {
        let mut pool = pool();
        let err = pool.add_class(class("Lapp/Main;", "Ljava/lang/Object;", &[]));
        assert!(matches!(err, Err(Error::DuplicateClass(_))));
    }
}
