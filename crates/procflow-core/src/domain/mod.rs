/// Process definition domain models
pub mod process_definition;

/// Process instance domain models
pub mod process_instance;

/// Task domain models
pub mod task;

/// Domain events
pub mod events;

/// Decision branch selection
pub mod condition;

/// Repository interfaces
pub mod repository;
