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

//! xDS-based name resolution for gRPC channels.
//!
//! A channel targeting `xds://[authority]/endpoint` delegates resolution to
//! the resolver in [`xds::resolver`], which subscribes to Listener and
//! RouteConfiguration resources on an xDS control plane and translates them
//! into a service config and a per-RPC config selector.  Call
//! [`xds::resolver::reg`] to register the resolver with the global resolver
//! registry.

pub mod attributes;
pub mod client;
pub mod credentials;
pub mod rt;
pub mod xds;

mod wrr;
