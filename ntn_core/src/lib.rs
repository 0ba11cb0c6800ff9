/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! Satellite handover-coordination control plane core.
//!
//! Eight components, each a module here: [`position_provider`] (C1),
//! [`scorer`] (C2), [`fast_access`] (C3), [`sync_scheduler`] (C4),
//! [`fine_grained_sync`] (C5), [`integration_bridge`] (C6),
//! [`measurement`] (C7) and [`event_bus`] (C8), wired together by
//! [`runtime::CoreRuntime`].

pub mod canned_provider;
pub mod event_bus;
pub mod fast_access;
pub mod fine_grained_sync;
pub mod integration_bridge;
pub mod measurement;
pub mod position_provider;
pub mod runtime;
pub mod scorer;
pub mod sync_scheduler;

pub use runtime::CoreRuntime;
