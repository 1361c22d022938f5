//! Supply/demand balancing.
//!
//! Runs at most once, before the first solver call. For every market the
//! aggregate supply is rescaled to the aggregate demand, so the calibration
//! target is structurally feasible. Markets already in balance are left
//! untouched. All joins are key-based: a supply row finds its market through
//! the real-estate table, a demand row through the agents table.

use crate::error::{CalibError, CalibResult};
use crate::table::{Table, Value};
use crate::types::MarketId;
use std::collections::BTreeMap;

pub fn balance_supply(
    supply: &Table,
    demand: &Table,
    real_estates_zones: &Table,
    agents: &Table,
) -> CalibResult<Table> {
    // (type, zone) -> market
    let mut market_of = BTreeMap::new();
    let re_types = real_estates_zones.id_column(0, "real_estates_zones")?;
    let re_zones = real_estates_zones.id_column(1, "real_estates_zones")?;
    let re_markets = real_estates_zones.id_column(2, "real_estates_zones")?;
    for ((t, z), m) in re_types.iter().zip(&re_zones).zip(&re_markets) {
        market_of.insert((*t, *z), *m);
    }

    // agent -> market
    let agent_ids = agents.id_column(0, "agents")?;
    let agent_markets = agents.id_column(1, "agents")?;
    let market_of_agent: BTreeMap<i64, i64> =
        agent_ids.iter().copied().zip(agent_markets.iter().copied()).collect();

    let supply_types = supply.id_column(0, "supply")?;
    let supply_zones = supply.id_column(1, "supply")?;
    let supply_counts = supply.num_column(2, "supply")?;
    let mut supply_market = Vec::with_capacity(supply.len());
    let mut supply_totals: BTreeMap<MarketId, f64> = BTreeMap::new();
    for ((t, z), count) in supply_types.iter().zip(&supply_zones).zip(&supply_counts) {
        let market = *market_of.get(&(*t, *z)).ok_or_else(|| CalibError::Schema {
            table: "supply".to_string(),
            detail: format!("row (type {t}, zone {z}) has no matching real-estate row"),
        })?;
        supply_market.push(market);
        *supply_totals.entry(market).or_insert(0.0) += count;
    }

    let demand_agents = demand.id_column(0, "demand")?;
    let demand_counts = demand.num_column(1, "demand")?;
    let mut demand_totals: BTreeMap<MarketId, f64> = BTreeMap::new();
    for (agent, count) in demand_agents.iter().zip(&demand_counts) {
        let market = *market_of_agent.get(agent).ok_or_else(|| CalibError::Schema {
            table: "demand".to_string(),
            detail: format!("agent {agent} not present in the agents table"),
        })?;
        *demand_totals.entry(market).or_insert(0.0) += count;
    }

    let mut factors: BTreeMap<MarketId, f64> = BTreeMap::new();
    for (&market, &s_m) in &supply_totals {
        let d_m = demand_totals.get(&market).copied().unwrap_or_else(|| {
            log::warn!("market {market} has supply but no demand");
            0.0
        });
        if d_m == s_m {
            factors.insert(market, 1.0);
            continue;
        }
        if s_m == 0.0 {
            return Err(CalibError::Balance { market });
        }
        log::info!(
            "market {market}: supply {s_m} != demand {d_m}, scaling by {:.6}",
            d_m / s_m
        );
        factors.insert(market, d_m / s_m);
    }

    let mut balanced = Table::new(supply.header.clone());
    for (row, market) in supply.rows.iter().zip(&supply_market) {
        let factor = factors[market];
        let mut new_row = row.clone();
        if let Some(Value::Num(count)) = new_row.get(2).cloned() {
            new_row[2] = Value::Num(count * factor);
        }
        balanced.push_row(new_row);
    }
    Ok(balanced)
}
