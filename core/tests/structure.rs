//! Structural-derivation tests for `fill_structure`: the canonical
//! real-estate ordering and the market-membership cutoff flags, exercised
//! with more than one market.

use landcal_core::store::TableSet;
use landcal_core::table::{Table, Value};

/// One zone, two markets: real-estate type 1 in market 1, type 2 in
/// market 2, with the rows deliberately given out of canonical order.
/// Agent 1 belongs to market 1, agent 2 to market 2.
fn two_market_set() -> TableSet {
    let mut zones = Table::new(vec!["I_IDX", "AREA"]);
    zones.push_row(vec![1.into(), 10.0.into()]);

    let mut real_estates_zones = Table::new(vec!["V_IDX", "I_IDX", "M_IDX"]);
    real_estates_zones.push_row(vec![2.into(), 1.into(), 2.into()]);
    real_estates_zones.push_row(vec![1.into(), 1.into(), 1.into()]);

    let mut agents = Table::new(vec!["IDAGENT", "IDMARKET", "UPPERBB"]);
    agents.push_row(vec![1.into(), 1.into(), 0.into()]);
    agents.push_row(vec![2.into(), 2.into(), 0.into()]);

    let mut demand = Table::new(vec!["H_IDX", "DEMAND"]);
    demand.push_row(vec![1.into(), 100.0.into()]);
    demand.push_row(vec![2.into(), 100.0.into()]);

    let mut supply = Table::new(vec!["V_IDX", "I_IDX", "NREST"]);
    supply.push_row(vec![1.into(), 1.into(), 100.0.into()]);
    supply.push_row(vec![2.into(), 1.into(), 100.0.into()]);

    let mut bids_adjustments = Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "BIDADJ"]);
    for agent in [1i64, 2] {
        for re_type in [1i64, 2] {
            bids_adjustments.push_row(vec![agent.into(), re_type.into(), 1.into(), 0.into()]);
        }
    }

    let mut rent_adjustments = Table::new(vec!["V_IDX", "I_IDX", "RENTADJ"]);
    rent_adjustments.push_row(vec![1.into(), 1.into(), 0.into()]);
    rent_adjustments.push_row(vec![2.into(), 1.into(), 0.into()]);

    let mut bids_functions = Table::new(vec!["IDMARKET", "IDAGENT", "IDATTRIB", "PARAM"]);
    bids_functions.push_row(vec![1.into(), 1.into(), 1.into(), 1.0.into()]);
    let mut rent_functions = Table::new(vec!["IDMARKET", "IDATTRIB", "PARAM"]);
    rent_functions.push_row(vec![1.into(), 1.into(), 1.0.into()]);

    TableSet {
        zones,
        real_estates_zones,
        agents,
        agents_zones: Table::new(vec!["H_IDX", "I_IDX", "ACC", "ATT"]),
        bids_adjustments,
        bids_functions,
        demand,
        demand_exogenous_cutoff: Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "DCUTOFF"]),
        rent_adjustments,
        rent_functions,
        subsidies: Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "SUBSIDIES"]),
        supply,
    }
}

#[test]
fn real_estate_rows_sorted_by_market_type_zone() {
    let tables = two_market_set().fill_structure().unwrap();

    // market-1 row first even though it was given second
    assert_eq!(
        tables.real_estates_zones.rows[0],
        vec![Value::Num(1.0), Value::Num(1.0), Value::Num(1.0)]
    );
    assert_eq!(
        tables.real_estates_zones.rows[1],
        vec![Value::Num(2.0), Value::Num(1.0), Value::Num(2.0)]
    );
}

#[test]
fn cutoff_flags_follow_market_membership() {
    let tables = two_market_set().fill_structure().unwrap();

    // real-estate rows outer (canonical order), agents inner:
    // (agent 1, market 1 estate) and (agent 2, market 2 estate) are the
    // only in-market pairs.
    let cutoff = &tables.demand_exogenous_cutoff;
    assert_eq!(cutoff.len(), 4);
    let flags: Vec<f64> = cutoff.num_column(3, "demand_exogenous_cutoff").unwrap();
    assert_eq!(flags, vec![1.0, 0.0, 0.0, 1.0]);

    // every row carries (agent, type, zone) of its pair
    assert_eq!(
        cutoff.rows[1],
        vec![Value::Num(2.0), Value::Num(1.0), Value::Num(1.0), Value::Num(0.0)]
    );
    assert_eq!(
        cutoff.rows[3],
        vec![Value::Num(2.0), Value::Num(2.0), Value::Num(1.0), Value::Num(1.0)]
    );
}

#[test]
fn derived_tables_span_both_markets() {
    let tables = two_market_set().fill_structure().unwrap();

    // agents_zones: 1 zone x 2 agents, zeroed
    assert_eq!(tables.agents_zones.len(), 2);
    assert_eq!(tables.agents_zones.rows[0][2], Value::Num(0.0));

    // subsidies mirror the cutoff's row order, all zero
    assert_eq!(tables.subsidies.len(), 4);
    assert!(tables
        .subsidies
        .num_column(3, "subsidies")
        .unwrap()
        .iter()
        .all(|&s| s == 0.0));
}
