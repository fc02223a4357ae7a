use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::principal::{PrincipalId, UnitId};
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllotmentId(pub String);

/// A faculty member bound to teach a class outside their own unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allotment {
    pub id: AllotmentId,
    pub request_id: RequestId,
    pub faculty_id: PrincipalId,
    /// Unit that borrows the faculty member and owns the class.
    pub teaching_unit: UnitId,
    /// Unit the faculty member belongs to.
    pub faculty_unit: UnitId,
    pub subject: String,
    pub class_name: String,
    pub section: String,
    pub course: Option<String>,
    pub semester: Option<u8>,
    pub slot: Option<String>,
    pub created_at: DateTime<Utc>,
}
