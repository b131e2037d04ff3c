// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod csv;
pub mod display;
pub mod draft;
pub mod failure;
pub mod ids;
pub mod model;
pub mod notify;
pub mod prefs;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod state;
pub mod submit;

pub use draft::*;
pub use failure::*;
pub use ids::*;
pub use model::*;
pub use notify::*;
pub use prefs::*;
pub use reconcile::*;
pub use remote::*;
pub use session::*;
pub use state::*;
pub use submit::*;
