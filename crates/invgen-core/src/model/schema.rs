//! Recognized column taxonomy for the host source table.
//!
//! Every header is classified exactly once: a recognized field, a member of the
//! sequential `product_N` family, or an extra column that is passed through to
//! the host variables untouched.

use serde::Serialize;

/// Columns the engine understands natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizedField {
    Hostname,
    CanonicalName,
    Environment,
    Status,
    Instance,
    SiteCode,
    SslPort,
    ApplicationService,
    PrimaryApplication,
    Function,
    BatchNumber,
    PatchMode,
    DashboardGroup,
    DecommissionDate,
    GroupPath,
    AnsibleTags,
    /// Legacy comma-separated product list.
    ProductId,
}

/// Value type enforced for a recognized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Date,
    Enum,
    List,
}

impl RecognizedField {
    pub const ALL: [RecognizedField; 17] = [
        RecognizedField::Hostname,
        RecognizedField::CanonicalName,
        RecognizedField::Environment,
        RecognizedField::Status,
        RecognizedField::Instance,
        RecognizedField::SiteCode,
        RecognizedField::SslPort,
        RecognizedField::ApplicationService,
        RecognizedField::PrimaryApplication,
        RecognizedField::Function,
        RecognizedField::BatchNumber,
        RecognizedField::PatchMode,
        RecognizedField::DashboardGroup,
        RecognizedField::DecommissionDate,
        RecognizedField::GroupPath,
        RecognizedField::AnsibleTags,
        RecognizedField::ProductId,
    ];

    /// Canonical column name, as written back to the source table.
    pub fn column(&self) -> &'static str {
        match self {
            RecognizedField::Hostname => "hostname",
            RecognizedField::CanonicalName => "canonical_name",
            RecognizedField::Environment => "environment",
            RecognizedField::Status => "status",
            RecognizedField::Instance => "instance",
            RecognizedField::SiteCode => "site_code",
            RecognizedField::SslPort => "ssl_port",
            RecognizedField::ApplicationService => "application_service",
            RecognizedField::PrimaryApplication => "primary_application",
            RecognizedField::Function => "function",
            RecognizedField::BatchNumber => "batch_number",
            RecognizedField::PatchMode => "patch_mode",
            RecognizedField::DashboardGroup => "dashboard_group",
            RecognizedField::DecommissionDate => "decommission_date",
            RecognizedField::GroupPath => "group_path",
            RecognizedField::AnsibleTags => "ansible_tags",
            RecognizedField::ProductId => "product_id",
        }
    }

    /// Older header spellings accepted on input.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            RecognizedField::CanonicalName => &["cname"],
            RecognizedField::SiteCode => &["datacenter"],
            _ => &[],
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            RecognizedField::SslPort | RecognizedField::BatchNumber => FieldType::Integer,
            RecognizedField::DecommissionDate => FieldType::Date,
            RecognizedField::Environment | RecognizedField::Status | RecognizedField::PatchMode => {
                FieldType::Enum
            }
            RecognizedField::AnsibleTags | RecognizedField::ProductId => FieldType::List,
            _ => FieldType::Text,
        }
    }

    /// Match a header (already trimmed and lowercased) against names and aliases.
    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.column() == header || f.aliases().contains(&header))
    }
}

impl std::fmt::Display for RecognizedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Classification of a single header cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Recognized(RecognizedField),
    /// `product_N`, carrying `N` (always >= 1).
    Product(u32),
    Extra,
}

const PRODUCT_PREFIX: &str = "product_";

/// Classify a raw header cell.
pub fn classify_header(raw: &str) -> ColumnKind {
    let header = raw.trim().to_lowercase();
    if let Some(field) = RecognizedField::from_header(&header) {
        return ColumnKind::Recognized(field);
    }
    if let Some(suffix) = header.strip_prefix(PRODUCT_PREFIX) {
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = suffix.parse::<u32>() {
                if n >= 1 {
                    return ColumnKind::Product(n);
                }
            }
        }
    }
    ColumnKind::Extra
}
