//! Database entity models and DTOs.

pub mod batch;
pub mod resource;
pub mod status;
pub mod task;
pub mod template;

pub use batch::{Batch, NewBatch};
pub use resource::{NewResource, Resource};
pub use status::{PreprocessingStatus, ResourceLifetime, ResourceRole, StatusId, TaskStatus};
pub use task::{NewTask, Task};
pub use template::{NewTemplate, Template};
