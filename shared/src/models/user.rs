//! User and role models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A staff account; the actor recorded on every ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub image: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    /// Employee
    Pegawai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Pegawai => "Pegawai",
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        role_capabilities(*self).contains(&capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Manager" => Ok(Role::Manager),
            "Pegawai" => Ok(Role::Pegawai),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Things a role may be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageCatalog,
    ScanProducts,
    RecordStock,
    ManageOrders,
    ManagePartners,
    ViewReports,
    /// Create, edit and remove staff accounts
    ManageUsers,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageCatalog => "manage_catalog",
            Capability::ScanProducts => "scan_products",
            Capability::RecordStock => "record_stock",
            Capability::ManageOrders => "manage_orders",
            Capability::ManagePartners => "manage_partners",
            Capability::ViewReports => "view_reports",
            Capability::ManageUsers => "manage_users",
        }
    }
}

/// Capabilities granted to each role
pub fn role_capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::Admin => &[
            Capability::ManageCatalog,
            Capability::ScanProducts,
            Capability::RecordStock,
            Capability::ManageOrders,
            Capability::ManagePartners,
            Capability::ViewReports,
            Capability::ManageUsers,
        ],
        Role::Manager => &[
            Capability::ScanProducts,
            Capability::ManageOrders,
            Capability::ManagePartners,
            Capability::ViewReports,
        ],
        Role::Pegawai => &[Capability::ScanProducts, Capability::RecordStock],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_can_do_everything() {
        for cap in [
            Capability::ManageCatalog,
            Capability::ScanProducts,
            Capability::RecordStock,
            Capability::ManageOrders,
            Capability::ManagePartners,
            Capability::ViewReports,
            Capability::ManageUsers,
        ] {
            assert!(Role::Admin.can(cap), "admin lacks {}", cap.as_str());
        }
    }

    #[test]
    fn test_employee_records_stock_but_not_orders() {
        assert!(Role::Pegawai.can(Capability::RecordStock));
        assert!(Role::Pegawai.can(Capability::ScanProducts));
        assert!(!Role::Pegawai.can(Capability::ManageOrders));
        assert!(!Role::Pegawai.can(Capability::ViewReports));
    }

    #[test]
    fn test_manager_cannot_touch_catalog_or_stock() {
        assert!(!Role::Manager.can(Capability::ManageCatalog));
        assert!(!Role::Manager.can(Capability::RecordStock));
        assert!(Role::Manager.can(Capability::ManageOrders));
    }

    #[test]
    fn test_only_admin_manages_users() {
        assert!(Role::Admin.can(Capability::ManageUsers));
        assert!(!Role::Manager.can(Capability::ManageUsers));
        assert!(!Role::Pegawai.can(Capability::ManageUsers));
    }

    #[test]
    fn test_role_parses_client_names() {
        assert_eq!("Pegawai".parse::<Role>().unwrap(), Role::Pegawai);
        assert!("Owner".parse::<Role>().is_err());
    }
}
