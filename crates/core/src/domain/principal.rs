use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organizational unit (department) a principal belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organizational rank.
///
/// Ranks are ordered `Student < Faculty < UnitHead < Administrator`.
/// `DeputyUnitHead` sits below `Administrator` and above `Faculty`, but it is
/// a substitute for the Administrator rather than a senior of `UnitHead`, so
/// the two are incomparable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Faculty,
    UnitHead,
    DeputyUnitHead,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::UnitHead => "unit_head",
            Self::DeputyUnitHead => "deputy_unit_head",
            Self::Administrator => "administrator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "student" => Some(Self::Student),
            "faculty" => Some(Self::Faculty),
            "unit_head" | "hod" => Some(Self::UnitHead),
            "deputy_unit_head" | "asst_hod" => Some(Self::DeputyUnitHead),
            "administrator" | "admin" => Some(Self::Administrator),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Student => 1,
            Self::Faculty => 2,
            Self::UnitHead | Self::DeputyUnitHead => 3,
            Self::Administrator => 4,
        }
    }

    pub const ALL: [Role; 5] =
        [Self::Student, Self::Faculty, Self::UnitHead, Self::DeputyUnitHead, Self::Administrator];

    /// Whether this role may act in place of an absent `holder`.
    pub fn stands_in_for(&self, holder: Role) -> bool {
        matches!((self, holder), (Self::DeputyUnitHead, Self::Administrator | Self::UnitHead))
    }

    /// Roles admitted when every holder of `holder` is unavailable.
    pub fn stand_ins(holder: Role) -> impl Iterator<Item = Role> {
        Self::ALL.into_iter().filter(move |role| role.stands_in_for(holder))
    }

    /// Roles that carry a unit affiliation.
    pub fn is_unit_scoped(&self) -> bool {
        !matches!(self, Self::Administrator)
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if matches!(
            (self, other),
            (Self::UnitHead, Self::DeputyUnitHead) | (Self::DeputyUnitHead, Self::UnitHead)
        ) {
            return None;
        }
        self.rank().partial_cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
    pub role: Role,
    pub unit: Option<UnitId>,
    pub active: bool,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
        unit: Option<&str>,
    ) -> Self {
        Self {
            id: PrincipalId(id.into()),
            display_name: display_name.into(),
            role,
            unit: unit.map(|unit| UnitId(unit.to_string())),
            active: true,
        }
    }

    pub fn belongs_to(&self, unit: &UnitId) -> bool {
        self.unit.as_ref() == Some(unit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub principal_id: PrincipalId,
    pub total_allowance: u32,
    pub consumed: u32,
}

impl LeaveBalance {
    /// Days left in the allowance. Negative when approvals overdraw it.
    pub fn remaining(&self) -> i64 {
        i64::from(self.total_allowance) - i64::from(self.consumed)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{LeaveBalance, PrincipalId, Role};

    #[test]
    fn ranks_are_ordered_from_student_to_administrator() {
        assert!(Role::Student < Role::Faculty);
        assert!(Role::Faculty < Role::UnitHead);
        assert!(Role::UnitHead < Role::Administrator);
        assert!(Role::DeputyUnitHead < Role::Administrator);
        assert!(Role::Faculty < Role::DeputyUnitHead);
    }

    #[test]
    fn deputy_is_not_comparable_with_unit_head() {
        assert_eq!(Role::UnitHead.partial_cmp(&Role::DeputyUnitHead), None);
        assert_eq!(Role::DeputyUnitHead.partial_cmp(&Role::UnitHead), None);
        assert_eq!(Role::DeputyUnitHead.partial_cmp(&Role::DeputyUnitHead), Some(Ordering::Equal));
    }

    #[test]
    fn only_deputies_stand_in_for_heads_and_the_administrator() {
        let for_administrator: Vec<Role> = Role::stand_ins(Role::Administrator).collect();
        let for_unit_head: Vec<Role> = Role::stand_ins(Role::UnitHead).collect();
        assert_eq!(for_administrator, [Role::DeputyUnitHead]);
        assert_eq!(for_unit_head, [Role::DeputyUnitHead]);
        assert_eq!(Role::stand_ins(Role::Faculty).count(), 0);
        assert!(!Role::UnitHead.stands_in_for(Role::Administrator));
    }

    #[test]
    fn parse_accepts_legacy_labels() {
        assert_eq!(Role::parse("HOD"), Some(Role::UnitHead));
        assert_eq!(Role::parse("Asst_HOD"), Some(Role::DeputyUnitHead));
        assert_eq!(Role::parse("deputy-unit-head"), Some(Role::DeputyUnitHead));
        assert_eq!(Role::parse("Admin"), Some(Role::Administrator));
        assert_eq!(Role::parse("dean"), None);
    }

    #[test]
    fn remaining_goes_negative_when_overdrawn() {
        let balance = LeaveBalance {
            principal_id: PrincipalId("stu-1".to_string()),
            total_allowance: 15,
            consumed: 17,
        };
        assert_eq!(balance.remaining(), -2);
    }
}
