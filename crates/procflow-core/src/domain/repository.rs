//! Repository traits for the Procflow Core
//!
//! This module defines the storage contracts used by the engine. External
//! crates can implement these traits to provide different persistence
//! mechanisms; in-memory implementations live in [`memory`] behind the
//! `testing` feature.

use async_trait::async_trait;
use std::collections::HashMap;

use super::process_definition::{ProcessDefinition, ProcessDefinitionId};
use super::process_instance::{InstanceStatus, ProcessInstance, ProcessInstanceId};
use super::task::{Task, TaskId};
use crate::CoreError;

/// Repository for process definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Save a new definition.
    ///
    /// Fails with `InvalidDefinition` if validation fails and with
    /// `DuplicateDefinition` if the id is already stored.
    async fn save(&self, definition: &ProcessDefinition) -> Result<(), CoreError>;

    /// Find a definition by ID
    async fn find_by_id(
        &self,
        id: &ProcessDefinitionId,
    ) -> Result<Option<ProcessDefinition>, CoreError>;

    /// Snapshot of every stored definition keyed by id
    async fn find_all(&self) -> Result<HashMap<String, ProcessDefinition>, CoreError>;

    /// Replace the stored definition with an inactive copy
    async fn deactivate(&self, id: &ProcessDefinitionId) -> Result<(), CoreError>;
}

/// Repository for process instances and their tasks
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Save an instance
    async fn save(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Update an instance
    async fn update(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Find an instance by ID
    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError>;

    /// List instances with optional filters
    async fn list_instances(
        &self,
        definition_id: Option<&ProcessDefinitionId>,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<ProcessInstance>, CoreError>;

    /// Save a task
    async fn save_task(&self, task: &Task) -> Result<(), CoreError>;

    /// Update a task
    async fn update_task(&self, task: &Task) -> Result<(), CoreError>;

    /// Find a task by ID
    async fn find_task_by_id(&self, id: &TaskId) -> Result<Option<Task>, CoreError>;

    /// Tasks of an instance in creation order
    async fn find_tasks_by_instance_id(
        &self,
        instance_id: &ProcessInstanceId,
    ) -> Result<Vec<Task>, CoreError>;

    /// Tasks assigned to `assignee`
    async fn find_tasks_by_assignee(&self, assignee: &str) -> Result<Vec<Task>, CoreError>;

    /// Persist an instance together with the tasks touched by one executor step
    async fn commit(&self, instance: &ProcessInstance, tasks: &[Task]) -> Result<(), CoreError> {
        for task in tasks {
            self.update_task(task).await?;
        }
        self.update(instance).await
    }
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::mapref::entry::Entry;
    use dashmap::DashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory implementation of the definition repository
    #[derive(Default)]
    pub struct MemoryDefinitionRepository {
        definitions: Arc<DashMap<String, ProcessDefinition>>,
    }

    impl MemoryDefinitionRepository {
        /// Create a new memory definition repository
        pub fn new() -> Self {
            Self {
                definitions: Arc::new(DashMap::with_capacity(16)),
            }
        }
    }

    #[async_trait]
    impl DefinitionRepository for MemoryDefinitionRepository {
        async fn save(&self, definition: &ProcessDefinition) -> Result<(), CoreError> {
            definition.validate()?;

            match self.definitions.entry(definition.id.0.clone()) {
                Entry::Occupied(_) => Err(CoreError::DuplicateDefinition(definition.id.0.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(definition.clone());
                    Ok(())
                }
            }
        }

        async fn find_by_id(
            &self,
            id: &ProcessDefinitionId,
        ) -> Result<Option<ProcessDefinition>, CoreError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn find_all(&self) -> Result<HashMap<String, ProcessDefinition>, CoreError> {
            Ok(self
                .definitions
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect())
        }

        async fn deactivate(&self, id: &ProcessDefinitionId) -> Result<(), CoreError> {
            let mut stored = self
                .definitions
                .get_mut(&id.0)
                .ok_or_else(|| CoreError::NotFound(format!("Process definition {}", id.0)))?;

            let replacement = ProcessDefinition {
                active: false,
                ..stored.clone()
            };
            *stored = replacement;
            Ok(())
        }
    }

    #[derive(Default)]
    struct InstanceTables {
        instances: HashMap<String, ProcessInstance>,
        tasks: HashMap<String, Task>,
        tasks_by_instance: HashMap<String, Vec<String>>,
    }

    impl InstanceTables {
        fn put_task(&mut self, task: &Task) {
            if self.tasks.insert(task.id.0.clone(), task.clone()).is_none() {
                self.tasks_by_instance
                    .entry(task.instance_id.0.clone())
                    .or_default()
                    .push(task.id.0.clone());
            }
        }
    }

    /// In-memory implementation of the instance repository
    ///
    /// One lock guards instances and tasks so that `commit` is atomic.
    #[derive(Default)]
    pub struct MemoryInstanceRepository {
        tables: Arc<RwLock<InstanceTables>>,
    }

    impl MemoryInstanceRepository {
        /// Create a new memory instance repository
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, InstanceTables>, CoreError> {
            self.tables.read().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })
        }

        fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, InstanceTables>, CoreError> {
            self.tables.write().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire write lock: {}", e))
            })
        }
    }

    #[async_trait]
    impl InstanceRepository for MemoryInstanceRepository {
        async fn save(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
            let mut tables = self.write()?;
            tables
                .instances
                .insert(instance.id.0.clone(), instance.clone());
            Ok(())
        }

        async fn update(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
            self.save(instance).await
        }

        async fn find_by_id(
            &self,
            id: &ProcessInstanceId,
        ) -> Result<Option<ProcessInstance>, CoreError> {
            Ok(self.read()?.instances.get(&id.0).cloned())
        }

        async fn list_instances(
            &self,
            definition_id: Option<&ProcessDefinitionId>,
            status: Option<InstanceStatus>,
        ) -> Result<Vec<ProcessInstance>, CoreError> {
            let tables = self.read()?;
            let mut result: Vec<ProcessInstance> = tables
                .instances
                .values()
                .filter(|i| definition_id.map_or(true, |d| &i.definition_id == d))
                .filter(|i| status.map_or(true, |s| i.status == s))
                .cloned()
                .collect();

            result.sort_by_key(|i| i.started_at);
            Ok(result)
        }

        async fn save_task(&self, task: &Task) -> Result<(), CoreError> {
            self.write()?.put_task(task);
            Ok(())
        }

        async fn update_task(&self, task: &Task) -> Result<(), CoreError> {
            self.save_task(task).await
        }

        async fn find_task_by_id(&self, id: &TaskId) -> Result<Option<Task>, CoreError> {
            Ok(self.read()?.tasks.get(&id.0).cloned())
        }

        async fn find_tasks_by_instance_id(
            &self,
            instance_id: &ProcessInstanceId,
        ) -> Result<Vec<Task>, CoreError> {
            let tables = self.read()?;
            let Some(task_ids) = tables.tasks_by_instance.get(&instance_id.0) else {
                return Ok(Vec::new());
            };

            Ok(task_ids
                .iter()
                .filter_map(|id| tables.tasks.get(id).cloned())
                .collect())
        }

        async fn find_tasks_by_assignee(&self, assignee: &str) -> Result<Vec<Task>, CoreError> {
            let tables = self.read()?;
            let mut result: Vec<Task> = tables
                .tasks
                .values()
                .filter(|t| t.assignee.as_deref() == Some(assignee))
                .cloned()
                .collect();

            result.sort_by_key(|t| t.created_at);
            Ok(result)
        }

        async fn commit(
            &self,
            instance: &ProcessInstance,
            tasks: &[Task],
        ) -> Result<(), CoreError> {
            let mut tables = self.write()?;
            for task in tasks {
                tables.put_task(task);
            }
            tables
                .instances
                .insert(instance.id.0.clone(), instance.clone());
            Ok(())
        }
    }
}
