//! Offline text generation.
//!
//! [`TemplateCapability`] renders each phase's artifact from the issue
//! provenance and earlier artifacts without calling out to a model. Output is
//! a pure function of the request, so reruns produce identical files.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Write as _;

use sparcflow_phase_api::{CapabilityRequest, CapabilityResponse, PhaseCapability};

use crate::nodes::spec_for;

/// Tool name recorded in `aiContext.toolCalls`.
pub const TEMPLATE_TOOL: &str = "template_render";

/// Longest excerpt of an earlier artifact copied into a rendered document.
const EXCERPT_LINES: usize = 12;

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateCapability;

#[async_trait]
impl PhaseCapability for TemplateCapability {
    fn name(&self) -> &str {
        TEMPLATE_TOOL
    }

    async fn generate(&self, request: CapabilityRequest) -> Result<CapabilityResponse> {
        Ok(CapabilityResponse::new(render(&request), TEMPLATE_TOOL))
    }
}

/// Render the markdown document for `request.phase`.
#[must_use]
pub fn render(request: &CapabilityRequest) -> String {
    let spec = spec_for(request.phase);
    let ctx = |key: &str| request.context.get(key).map(String::as_str).unwrap_or("");

    let mut out = String::new();
    let _ = writeln!(out, "# {}: {}", spec.title, ctx("issue_title"));
    out.push('\n');
    let _ = writeln!(out, "## Issue\n\n{}\n", ctx("issue_description").trim());

    let input = ctx("user_input").trim();
    if !input.is_empty() && input != ctx("issue_description").trim() {
        let _ = writeln!(out, "## Request\n\n{input}\n");
    }

    let mut inputs = spec
        .deps
        .iter()
        .filter_map(|dep| {
            let key = dep.artifact_key();
            request.context.get(key).map(|text| (key, text))
        })
        .peekable();
    if inputs.peek().is_some() {
        out.push_str("## Inputs\n\n");
        for (key, text) in inputs {
            let _ = writeln!(out, "### {key}\n");
            for line in text.lines().take(EXCERPT_LINES) {
                let _ = writeln!(out, "> {line}");
            }
            out.push('\n');
        }
    }

    let _ = writeln!(out, "## {}\n\n{}", spec.title, spec.instructions);
    out
}
