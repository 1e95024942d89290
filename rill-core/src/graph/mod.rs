//! Subscriber Graph
//!
//! Node identity and classification for the reactive graph, plus the owner
//! side-table used by consumers that need to find the model behind an
//! object they render.
//!
//! # Overview
//!
//! Propagation in this crate is push-based and synchronous: a node fires its
//! subscribers directly and there is no central scheduler. What remains
//! global is identity. Every node carries a [`NodeId`] (used in errors and
//! logs) and a [`NodeKind`] discriminant, so that code handling "some
//! reactive source" matches on an explicit tag instead of inspecting shapes.
//! The same holds at the rendering boundary, where values are resolved once
//! into a [`RenderValue`].

mod node;
mod owners;
mod value;

pub use node::{AnySource, ChangeSource, NodeId, NodeKind};
pub use owners::{OwnerKey, OwnerTable};
pub use value::{render, RenderValue};
