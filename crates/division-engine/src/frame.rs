//! Frame submission loop.
//!
//! `Idle → Clear → {bind pass[i], draw pass[i]}* → Present → Idle`.
//! Within a pass the vertex buffer is bound before the program, the program
//! before the uniforms, and the uniforms before the draw.

use crate::backend::Backend;
use crate::color::Color;
use crate::error::{EngineError, ErrorReporter, Result};
use crate::resources::{DrawRange, RenderPass, Resources};

/// What one call to the submission loop did.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub passes_drawn: u32,
    /// Passes that referenced a stale resource or failed to bind or draw.
    pub passes_skipped: u32,
    /// `draw` plus `multi_draw` calls issued.
    pub draw_calls: u32,
    /// The backend had no target this tick; nothing was submitted.
    pub frame_skipped: bool,
}

/// Replays every registered pass once.
///
/// Per-pass failures are reported and the pass is skipped; the frame is still
/// presented. A fatal backend error is returned after presenting, and errors from
/// `begin_frame`/`present` are returned unreported for the caller to handle.
pub(crate) fn submit_frame<B: Backend>(
    backend: &mut B,
    resources: &Resources<B>,
    clear: Color,
    reporter: &mut ErrorReporter,
) -> Result<FrameStats> {
    let mut stats = FrameStats::default();

    match backend.begin_frame(clear) {
        Ok(()) => {}
        Err(EngineError::FrameSkipped(reason)) => {
            log::debug!("frame skipped: {reason}");
            stats.frame_skipped = true;
            return Ok(stats);
        }
        Err(e) => return Err(e),
    }

    let mut fatal = None;
    for (id, pass) in resources.render_passes.iter_in_order() {
        match submit_pass(backend, resources, pass) {
            Ok(()) => {
                stats.passes_drawn += 1;
                stats.draw_calls += 1;
            }
            Err(e) => {
                stats.passes_skipped += 1;
                log::debug!("render pass {id} skipped");
                if e.is_fatal() {
                    fatal.get_or_insert(e);
                } else {
                    reporter.report(&e);
                }
            }
        }
    }

    match backend.present() {
        Ok(()) => {}
        Err(EngineError::FrameSkipped(reason)) => {
            log::debug!("present skipped: {reason}");
            stats.frame_skipped = true;
        }
        Err(e) => return Err(e),
    }

    log::trace!(
        "frame: {} passes drawn, {} skipped, {} draw calls",
        stats.passes_drawn,
        stats.passes_skipped,
        stats.draw_calls
    );

    match fatal {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

fn submit_pass<B: Backend>(backend: &mut B, resources: &Resources<B>, pass: &RenderPass<B>) -> Result<()> {
    let desc = pass.descriptor();
    let vb = resources.vertex_buffers.get(desc.vertex_buffer)?;
    let (program, _) = resources.shader_programs.linked(desc.program)?;
    // Resolved up front so a stale uniform skips the pass before anything is bound.
    let uniforms = desc
        .uniforms
        .iter()
        .map(|&u| resources.uniform_buffers.get(u))
        .collect::<Result<Vec<_>>>()?;

    backend.bind_vertex_buffer(vb.platform())?;
    backend.bind_program(program, pass.pipeline())?;
    for ub in uniforms {
        backend.bind_uniform(ub.platform(), ub.binding(), ub.stage())?;
    }

    match desc.range {
        DrawRange::Vertices { first, count } => backend.draw(vb.topology(), first, count, desc.instances),
        DrawRange::Objects => {
            backend.multi_draw(vb.topology(), vb.starts(), vb.counts(), desc.instances)
        }
    }
}
