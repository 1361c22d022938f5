//! Structural validation of a loaded table set.
//!
//! Checks run in a fixed order (zones, real estate, agents, function tables,
//! row counts), short-circuiting on the first violated invariant. Validation
//! never mutates the tables; it only reports the model dimensions.

use crate::error::{CalibResult, ValidationFailure};
use crate::store::TableSet;
use serde::Serialize;

/// The model dimensions established by a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub n_zones: usize,
    pub n_types: usize,
    pub n_markets: usize,
    pub n_agents: usize,
}

pub fn validate(tables: &TableSet) -> CalibResult<ValidationReport> {
    // 1. Zones: unique ids define nZones.
    let n_zones = tables.zones.len();
    let distinct_zones = tables.zones.distinct_ids(0, "zones")?.len();
    if distinct_zones != n_zones {
        return Err(ValidationFailure::DuplicateZoneIds {
            distinct: distinct_zones,
            rows: n_zones,
        }
        .into());
    }

    // 2. Real estate: zone coverage, market and type counts.
    let re = &tables.real_estates_zones;
    let re_zones = re.distinct_ids(1, "real_estates_zones")?.len();
    if re_zones != n_zones {
        return Err(ValidationFailure::ZoneMismatch {
            distinct: re_zones,
            expected: n_zones,
        }
        .into());
    }
    let n_types = re.distinct_ids(0, "real_estates_zones")?.len();
    let n_markets = re.distinct_ids(2, "real_estates_zones")?.len();

    // 3. Agents: market partition must match the real-estate side.
    let agent_markets = tables.agents.distinct_ids(1, "agents")?.len();
    if agent_markets != n_markets {
        return Err(ValidationFailure::MarketMismatch {
            agents: agent_markets,
            real_estate: n_markets,
        }
        .into());
    }
    let n_agents = tables.agents.len();

    // 4. Function tables are opaque but must be present before any run.
    if tables.bids_functions.is_empty() {
        return Err(ValidationFailure::MissingFunctionTable("bids_functions").into());
    }
    if tables.rent_functions.is_empty() {
        return Err(ValidationFailure::MissingFunctionTable("rent_functions").into());
    }

    // 5. Row counts tied to the dimensions above.
    if tables.demand.len() != n_agents {
        return Err(ValidationFailure::RowCountMismatch {
            table: "demand",
            expected: n_agents,
            actual: tables.demand.len(),
        }
        .into());
    }
    if tables.supply.len() != re.len() {
        return Err(ValidationFailure::RowCountMismatch {
            table: "supply",
            expected: re.len(),
            actual: tables.supply.len(),
        }
        .into());
    }

    Ok(ValidationReport {
        n_zones,
        n_types,
        n_markets,
        n_agents,
    })
}
