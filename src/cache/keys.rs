//! Cache key definitions.

use std::fmt;

use serde::Serialize;

use crate::domain::types::Table;

/// Logical resource names under which fetched collections are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKey {
    Clients,
    Appointments,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::Clients, CacheKey::Appointments];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKey::Clients => "clients",
            CacheKey::Appointments => "appointments",
        }
    }

    /// The one key whose collection is invalidated by writes to `table`.
    ///
    /// Appointments denormalize the client name, yet client writes map only to
    /// `Clients`: the appointment list keeps the old name until it refetches.
    pub fn for_table(table: Table) -> Self {
        match table {
            Table::Clients => CacheKey::Clients,
            Table::Appointments => CacheKey::Appointments,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_table_maps_to_exactly_its_own_key() {
        assert_eq!(CacheKey::for_table(Table::Clients), CacheKey::Clients);
        assert_eq!(
            CacheKey::for_table(Table::Appointments),
            CacheKey::Appointments
        );
    }

    #[test]
    fn logical_names_match_the_resource_names() {
        let names: Vec<_> = CacheKey::ALL.iter().map(|key| key.as_str()).collect();
        assert_eq!(names, ["clients", "appointments"]);
    }
}
