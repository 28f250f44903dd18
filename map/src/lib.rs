//! Battle-map engine: scene document, camera math, input state machine,
//! and the render pipeline.
//!
//! ARCHITECTURE
//! ============
//! The crate is split along the persisted/transient boundary:
//! - [`scene`] owns the versioned [`scene::SceneDoc`], the only state that is
//!   serialized and replicated. [`migrate`] upgrades older persisted shapes.
//! - [`input`] holds the transient [`input::UiState`] and the pointer gesture
//!   machine. Nothing in it ever reaches the wire.
//! - [`render`] turns (document, transient state, overlays) into a display
//!   list; hosts rasterize it. Keeping the pipeline headless is what lets the
//!   whole engine be tested without a browser or GPU.
//! - [`engine`] is the facade hosts talk to: it owns one document, one
//!   transient state, the active gesture, and the dirty/redraw bookkeeping.

pub mod camera;
pub mod censor;
pub mod consts;
pub mod distance;
pub mod engine;
pub mod input;
pub mod migrate;
pub mod render;
pub mod scene;
