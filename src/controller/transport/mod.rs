//! Non-realtime transport logic, split by concern the way the original
//! Python `controller/transport/` package was (`bpm.py`, `global_params.py`,
//! `pad.py`, `playback.py`, `loop.py`), but as `impl` blocks on the single
//! owned [`super::Controller`] rather than composed sub-controller objects,
//! since Rust's ownership model doesn't let several structs each hold an
//! independent `&mut` into the same project/session state at once.

mod bpm;
mod global_params;
mod loop_ctl;
mod pad;
mod playback;
