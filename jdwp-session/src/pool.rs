// Identity pool
//
// One canonical instance per (entity kind, identity key) for the lifetime of
// a session. Entities are populated in place after construction, so every
// alias must resolve to the same allocation.

use crate::array::Array;
use crate::location::Location;
use crate::method::{Method, Slot};
use crate::object::Object;
use crate::poison::lock;
use crate::reftype::{Class, Field};
use crate::stackframe::Frame;
use crate::string::StringRef;
use crate::thread::Thread;
use crate::types::{FieldId, FrameId, MethodId, ObjectId, ReferenceTypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// One table per entity kind
#[derive(Default)]
pub struct PoolTables {
    classes: HashMap<ReferenceTypeId, Arc<Class>>,
    fields: HashMap<(ReferenceTypeId, FieldId), Arc<Field>>,
    methods: HashMap<(ReferenceTypeId, MethodId), Arc<Method>>,
    slots: HashMap<(ReferenceTypeId, MethodId, i32), Arc<Slot>>,
    locations: HashMap<(ReferenceTypeId, MethodId, i64), Arc<Location>>,
    threads: HashMap<ObjectId, Arc<Thread>>,
    frames: HashMap<(ObjectId, FrameId), Arc<Frame>>,
    objects: HashMap<ObjectId, Arc<Object>>,
    arrays: HashMap<ObjectId, Arc<Array>>,
    strings: HashMap<ObjectId, Arc<StringRef>>,
}

/// An entity kind that can live in the pool
pub trait Pooled: Send + Sync + Sized + 'static {
    type Key: Hash + Eq + Copy;

    fn table(tables: &mut PoolTables) -> &mut HashMap<Self::Key, Arc<Self>>;
}

macro_rules! pooled {
    ($ty:ty, $key:ty, $table:ident) => {
        impl Pooled for $ty {
            type Key = $key;

            fn table(tables: &mut PoolTables) -> &mut HashMap<Self::Key, Arc<Self>> {
                &mut tables.$table
            }
        }
    };
}

pooled!(Class, ReferenceTypeId, classes);
pooled!(Field, (ReferenceTypeId, FieldId), fields);
pooled!(Method, (ReferenceTypeId, MethodId), methods);
pooled!(Slot, (ReferenceTypeId, MethodId, i32), slots);
pooled!(Location, (ReferenceTypeId, MethodId, i64), locations);
pooled!(Thread, ObjectId, threads);
pooled!(Frame, (ObjectId, FrameId), frames);
pooled!(Object, ObjectId, objects);
pooled!(Array, ObjectId, arrays);
pooled!(StringRef, ObjectId, strings);

#[derive(Default)]
pub struct IdentityPool {
    tables: Mutex<PoolTables>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical instance for `key`, building it with `make` on a
    /// miss.
    ///
    /// `make` runs under the pool lock and must not touch the pool itself.
    pub fn get_or_create<T, F>(&self, key: T::Key, make: F) -> Arc<T>
    where
        T: Pooled,
        F: FnOnce() -> T,
    {
        let mut tables = lock(&self.tables, "identity pool");
        T::table(&mut tables)
            .entry(key)
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    /// Look up an instance without creating it
    pub fn get<T: Pooled>(&self, key: T::Key) -> Option<Arc<T>> {
        let mut tables = lock(&self.tables, "identity pool");
        T::table(&mut tables).get(&key).cloned()
    }

    pub fn len<T: Pooled>(&self) -> usize {
        let mut tables = lock(&self.tables, "identity pool");
        T::table(&mut tables).len()
    }
}
