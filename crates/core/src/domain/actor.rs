use serde::{Deserialize, Serialize};

/// Permission granting every service type regardless of role.
pub const ALL_PERMISSION: &str = "all";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    CompanyAdmin,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "superadmin",
            Self::CompanyAdmin => "admin",
            Self::Operator => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "superadmin" | "super_admin" => Some(Self::SuperAdmin),
            "admin" | "company_admin" => Some(Self::CompanyAdmin),
            "user" | "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// Identity acting on a service record, supplied by the authorization collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub company_id: Option<i64>,
    pub permissions: Vec<String>,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            company_id: None,
            permissions,
        }
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn has_permission(&self, service_type_id: &str) -> bool {
        if self.role == Role::SuperAdmin {
            return true;
        }
        self.permissions
            .iter()
            .any(|permission| permission == ALL_PERMISSION || permission == service_type_id)
    }

    /// Name written into change-log entries; blank names fall back to `system_label`.
    pub fn log_name<'a>(&'a self, system_label: &'a str) -> &'a str {
        let name = self.display_name.trim();
        if name.is_empty() {
            system_label
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Role};

    #[test]
    fn super_admin_is_granted_every_service_type() {
        let actor = Actor::new("1", "Super Admin", Role::SuperAdmin, Vec::new());
        assert!(actor.has_permission("grua"));
        assert!(actor.has_permission("plomeria"));
    }

    #[test]
    fn operator_permissions_are_scoped_to_listed_types() {
        let actor = Actor::new("3", "Operador Grúas", Role::Operator, vec!["grua".to_string()])
            .with_company(1);

        assert!(actor.has_permission("grua"));
        assert!(!actor.has_permission("corriente"));
        assert_eq!(actor.company_id, Some(1));
    }

    #[test]
    fn all_permission_acts_as_wildcard() {
        let actor = Actor::new("2", "Admin", Role::CompanyAdmin, vec!["all".to_string()]);
        assert!(actor.has_permission("farmacia"));
    }

    #[test]
    fn blank_display_name_falls_back_to_system_label() {
        let actor = Actor::new("9", "   ", Role::Operator, Vec::new());
        assert_eq!(actor.log_name("Sistema"), "Sistema");
    }

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in [Role::SuperAdmin, Role::CompanyAdmin, Role::Operator] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
