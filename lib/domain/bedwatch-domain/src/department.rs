use serde::{Deserialize, Serialize};

pub type DepartmentId = String;

/// Reference data for a ward. Owned outside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub total_beds: u32,
}

impl Department {
    pub fn new(id: impl Into<DepartmentId>, name: impl Into<String>, total_beds: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_beds,
        }
    }
}
