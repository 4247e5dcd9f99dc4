//! Room-scoped relay for a shared whiteboard: live events fan out to everyone else in the
//! room, strokes and clears go to an append-only log, and late joiners get that log replayed.

pub mod canvas;
pub mod config;
pub mod error;
pub mod model;
pub mod presence;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils {
    pub mod clean;
}
pub mod viewer;
