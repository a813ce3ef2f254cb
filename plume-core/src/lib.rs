//! PLUME Core - Entity Types
//!
//! Pure data structures shared by the cache and its collaborators: typed
//! identifiers, blog entities, mutation inputs and the backend error taxonomy.

mod entities;
mod enums;
mod error;
mod identity;

pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
