//! Static call-flag table for common graphics APIs.
//!
//! [`ApiCallTable`] is the default [`CallClassifier`]: exact-name entries
//! for frame terminators, draw calls, and debug markers, plus prefix
//! rules for side-effect-free queries.

use std::sync::OnceLock;

use indexmap::IndexMap;

use calltrace_core::{CallClassifier, CallFlags};

const SWAP: CallFlags = CallFlags::from_bits(
    CallFlags::END_FRAME.bits() | CallFlags::SWAP_RENDERTARGET.bits(),
);
const PUSH: CallFlags =
    CallFlags::from_bits(CallFlags::MARKER.bits() | CallFlags::MARKER_PUSH.bits());
const POP: CallFlags = CallFlags::from_bits(CallFlags::MARKER.bits() | CallFlags::MARKER_POP.bits());

const ENTRIES: &[(&str, CallFlags)] = &[
    // Frame terminators.
    ("glXSwapBuffers", SWAP),
    ("wglSwapBuffers", SWAP),
    ("wglSwapLayerBuffers", SWAP),
    ("eglSwapBuffers", SWAP),
    ("eglSwapBuffersWithDamageKHR", SWAP),
    ("CGLFlushDrawable", SWAP),
    ("IDXGISwapChain::Present", SWAP),
    ("IDXGISwapChain1::Present1", SWAP),
    ("IDirect3DDevice9::Present", SWAP),
    ("glFrameTerminatorGREMEDY", CallFlags::END_FRAME),
    // Draws.
    ("glBegin", CallFlags::RENDER),
    ("glDrawArrays", CallFlags::RENDER),
    ("glDrawArraysInstanced", CallFlags::RENDER),
    ("glDrawElements", CallFlags::RENDER),
    ("glDrawElementsInstanced", CallFlags::RENDER),
    ("glDrawElementsBaseVertex", CallFlags::RENDER),
    ("glDrawRangeElements", CallFlags::RENDER),
    ("glMultiDrawArrays", CallFlags::RENDER),
    ("glMultiDrawElements", CallFlags::RENDER),
    ("glDispatchCompute", CallFlags::RENDER),
    ("glClear", CallFlags::RENDER),
    ("glBlitFramebuffer", CallFlags::RENDER),
    ("ID3D11DeviceContext::Draw", CallFlags::RENDER),
    ("ID3D11DeviceContext::DrawIndexed", CallFlags::RENDER),
    ("IDirect3DDevice9::DrawPrimitive", CallFlags::RENDER),
    ("IDirect3DDevice9::DrawIndexedPrimitive", CallFlags::RENDER),
    // Debug markers.
    ("glPushDebugGroup", PUSH),
    ("glPushGroupMarkerEXT", PUSH),
    ("glPopDebugGroup", POP),
    ("glPopGroupMarkerEXT", POP),
    ("glDebugMessageInsert", CallFlags::MARKER),
    ("glInsertEventMarkerEXT", CallFlags::MARKER),
    ("glStringMarkerGREMEDY", CallFlags::MARKER),
    // Calls that cannot be replayed faithfully.
    ("glXGetProcAddress", CallFlags::NON_REPRODUCIBLE),
    ("glXGetProcAddressARB", CallFlags::NON_REPRODUCIBLE),
    ("wglGetProcAddress", CallFlags::NON_REPRODUCIBLE),
    ("eglGetProcAddress", CallFlags::NON_REPRODUCIBLE),
    ("glMapBuffer", CallFlags::NON_REPRODUCIBLE),
    ("glMapBufferRange", CallFlags::NON_REPRODUCIBLE),
];

/// Prefixes of query functions with no side effects.
const QUERY_PREFIXES: &[&str] = &["glGet", "glIs", "glAreTexturesResident", "eglQuery"];

/// Functions whose zero return means "nothing to report".
const ERROR_QUERIES: &[&str] = &["glGetError", "glGetGraphicsResetStatus", "eglGetError"];

fn table() -> &'static IndexMap<&'static str, CallFlags> {
    static TABLE: OnceLock<IndexMap<&'static str, CallFlags>> = OnceLock::new();
    TABLE.get_or_init(|| ENTRIES.iter().copied().collect())
}

/// Call-flag classifier for OpenGL, GLX/WGL/EGL/CGL, and Direct3D names.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApiCallTable;

impl ApiCallTable {
    /// Number of exact-name entries.
    pub fn len(&self) -> usize {
        table().len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        table().is_empty()
    }

    /// Iterate exact-name entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, CallFlags)> {
        table().iter().map(|(name, flags)| (*name, *flags))
    }
}

impl CallClassifier for ApiCallTable {
    fn classify(&self, name: &str) -> CallFlags {
        if let Some(flags) = table().get(name) {
            return *flags;
        }
        if QUERY_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return CallFlags::NO_SIDE_EFFECTS;
        }
        CallFlags::empty()
    }

    fn is_error_query(&self, name: &str) -> bool {
        // Extension-suffixed variants (glGetGraphicsResetStatusARB) count too.
        ERROR_QUERIES.iter().any(|q| {
            name.strip_prefix(q)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_uppercase()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_end_frames() {
        let t = ApiCallTable;
        for name in ["glXSwapBuffers", "eglSwapBuffers", "IDXGISwapChain::Present"] {
            let flags = t.classify(name);
            assert!(flags.ends_frame(), "{name}");
            assert!(flags.contains(CallFlags::SWAP_RENDERTARGET));
        }
        assert!(t.classify("glFrameTerminatorGREMEDY").ends_frame());
    }

    #[test]
    fn queries_have_no_side_effects() {
        let t = ApiCallTable;
        assert_eq!(t.classify("glGetIntegerv"), CallFlags::NO_SIDE_EFFECTS);
        assert_eq!(t.classify("glIsEnabled"), CallFlags::NO_SIDE_EFFECTS);
        assert_eq!(t.classify("glViewport"), CallFlags::empty());
    }

    #[test]
    fn markers_push_and_pop() {
        let t = ApiCallTable;
        assert!(t.classify("glPushDebugGroup").contains(CallFlags::MARKER_PUSH));
        assert!(t.classify("glPopDebugGroup").contains(CallFlags::MARKER_POP));
        assert!(t.classify("glDebugMessageInsert").contains(CallFlags::MARKER));
    }

    #[test]
    fn error_queries_match_suffixed_variants() {
        let t = ApiCallTable;
        assert!(t.is_error_query("glGetError"));
        assert!(t.is_error_query("glGetGraphicsResetStatusARB"));
        assert!(!t.is_error_query("glGetErrorString"));
        assert!(!t.is_error_query("glGetIntegerv"));
    }

    #[test]
    fn entries_keep_declaration_order() {
        let t = ApiCallTable;
        assert_eq!(t.entries().next().map(|(n, _)| n), Some("glXSwapBuffers"));
        assert_eq!(t.len(), ENTRIES.len());
        assert!(!t.is_empty());
    }
}
