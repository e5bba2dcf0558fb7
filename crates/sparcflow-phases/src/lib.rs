//! Concrete phase nodes for the sparcflow workflow
//!
//! Every phase is an [`ArtifactNode`]: it asks a
//! [`PhaseCapability`](sparcflow_phase_api::PhaseCapability) for the text of
//! its artifact, stores it under the phase's artifact key and raises progress
//! to the phase's milestone. [`NodeRegistry`] maps phases to nodes for the
//! driver and [`TemplateCapability`] renders artifacts offline.

pub mod nodes;
pub mod registry;
pub mod template;

pub use nodes::{ArtifactNode, NODE_SPECS, NodeSpec, spec_for};
pub use registry::NodeRegistry;
pub use template::{TEMPLATE_TOOL, TemplateCapability, render};
