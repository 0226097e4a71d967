/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! A type-keyed map of arbitrary values passed between channel components.
//!
//! Attributes ride along with resolver updates and per-RPC configuration so
//! that producers (e.g. a name resolver) can hand opaque data to consumers
//! (e.g. an LB policy) without the intermediate layers knowing its type.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

/// An immutable-once-shared collection of values keyed by their type.  At
/// most one value of any given type may be present.
#[derive(Clone, Default)]
pub struct Attributes {
    m: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.m.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns the value of type `T`, if one was stored.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.m
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attributes({} entries)", self.m.len())
    }
}
