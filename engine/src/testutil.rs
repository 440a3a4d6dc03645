//! Shared helpers for the engine's unit tests.

use std::sync::Arc;

use crate::backend::SimBackend;
use crate::printer::BufferPrinter;
use crate::registry::Registry;
use crate::world::World;

pub(crate) fn test_world() -> World {
    test_world_with_printer().0
}

pub(crate) fn test_world_with_printer() -> (World, Arc<BufferPrinter>) {
    let backend = Arc::new(SimBackend::with_accounts(&["root", "alice", "bob"]));
    let printer = Arc::new(BufferPrinter::new());
    let accounts = backend.named_accounts();
    let world = World::init(
        "test",
        accounts,
        backend,
        Arc::new(Registry::core()),
        printer.clone(),
    );
    (world, printer)
}
