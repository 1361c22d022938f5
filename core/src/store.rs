//! The table store: the fixed set of solver input tables, loadable from any
//! source that can produce them, plus the structural-fill step that derives
//! the cartesian tables.
//!
//! RULE: tables are populated once at load time. After `fill_structure` the
//! only tables mutated during a calibration run are `bids_adjustments` (by
//! the engine) and `supply` (once, by the balancer).

use crate::csv;
use crate::error::{CalibError, CalibResult};
use crate::table::{Table, Value};
use crate::types::{MarketId, TypeId, ZoneId};
use std::path::{Path, PathBuf};

/// The twelve tables the solver's file protocol requires, by wire name.
pub const INPUT_TABLES: [&str; 12] = [
    "agents",
    "agents_zones",
    "bids_adjustments",
    "bids_functions",
    "demand",
    "demand_exogenous_cutoff",
    "real_estates_zones",
    "rent_adjustments",
    "rent_functions",
    "subsidies",
    "supply",
    "zones",
];

/// The five tables the solver writes back.
pub const OUTPUT_TABLES: [&str; 5] = [
    "bids",
    "bh",
    "location",
    "location_probability",
    "rents",
];

/// Anything that can hand over the input tables by wire name: a directory of
/// CSV exports, a spatial-database extraction, a test fixture.
pub trait TableSource {
    fn read_table(&self, name: &str) -> CalibResult<Table>;
}

/// A directory holding `<name>.csv` per input table.
pub struct CsvDirectory {
    root: PathBuf,
}

impl CsvDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TableSource for CsvDirectory {
    fn read_table(&self, name: &str) -> CalibResult<Table> {
        let path = self.root.join(format!("{name}.csv"));
        if !path.exists() {
            return Err(CalibError::MissingTable {
                name: name.to_string(),
                path,
            });
        }
        csv::read_table(&path, name)
    }
}

/// One named field per input table, so the set is statically complete.
#[derive(Debug, Clone)]
pub struct TableSet {
    pub zones: Table,
    pub real_estates_zones: Table,
    pub agents: Table,
    pub agents_zones: Table,
    pub bids_adjustments: Table,
    pub bids_functions: Table,
    pub demand: Table,
    pub demand_exogenous_cutoff: Table,
    pub rent_adjustments: Table,
    pub rent_functions: Table,
    pub subsidies: Table,
    pub supply: Table,
}

impl TableSet {
    pub fn load(source: &dyn TableSource) -> CalibResult<Self> {
        Ok(Self {
            agents: source.read_table("agents")?,
            agents_zones: source.read_table("agents_zones")?,
            bids_adjustments: source.read_table("bids_adjustments")?,
            bids_functions: source.read_table("bids_functions")?,
            demand: source.read_table("demand")?,
            demand_exogenous_cutoff: source.read_table("demand_exogenous_cutoff")?,
            real_estates_zones: source.read_table("real_estates_zones")?,
            rent_adjustments: source.read_table("rent_adjustments")?,
            rent_functions: source.read_table("rent_functions")?,
            subsidies: source.read_table("subsidies")?,
            supply: source.read_table("supply")?,
            zones: source.read_table("zones")?,
        })
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> CalibResult<Self> {
        Self::load(&CsvDirectory::new(root))
    }

    /// All input tables paired with their wire names, in protocol order.
    pub fn iter(&self) -> [(&'static str, &Table); 12] {
        [
            ("agents", &self.agents),
            ("agents_zones", &self.agents_zones),
            ("bids_adjustments", &self.bids_adjustments),
            ("bids_functions", &self.bids_functions),
            ("demand", &self.demand),
            ("demand_exogenous_cutoff", &self.demand_exogenous_cutoff),
            ("real_estates_zones", &self.real_estates_zones),
            ("rent_adjustments", &self.rent_adjustments),
            ("rent_functions", &self.rent_functions),
            ("subsidies", &self.subsidies),
            ("supply", &self.supply),
            ("zones", &self.zones),
        ]
    }

    /// Derive the structural tables from zones, agents and real estate:
    /// `agents_zones` (agent × zone accessibility grid, zeroed),
    /// `demand_exogenous_cutoff` (1 iff the agent's market matches the
    /// real-estate row's market) and `subsidies` (zeroed). Also puts
    /// `real_estates_zones` into its canonical (market, type, zone) order,
    /// which the derived row orders then follow.
    pub fn fill_structure(mut self) -> CalibResult<Self> {
        let zone_ids = self.zones.id_column(0, "zones")?;
        let agent_ids = self.agents.id_column(0, "agents")?;
        let agent_markets = self.agents.id_column(1, "agents")?;

        let re = "real_estates_zones";
        let mut re_keys: Vec<(MarketId, TypeId, ZoneId)> =
            Vec::with_capacity(self.real_estates_zones.len());
        for (i, row) in self.real_estates_zones.rows.iter().enumerate() {
            let key = (
                row.get(2).and_then(Value::as_id),
                row.get(0).and_then(Value::as_id),
                row.get(1).and_then(Value::as_id),
            );
            match key {
                (Some(market), Some(re_type), Some(zone)) => re_keys.push((market, re_type, zone)),
                _ => {
                    return Err(CalibError::Schema {
                        table: re.to_string(),
                        detail: format!("row {i}: expected integral (type, zone, market) ids"),
                    })
                }
            }
        }
        let mut order: Vec<usize> = (0..re_keys.len()).collect();
        order.sort_by_key(|&i| re_keys[i]);
        self.real_estates_zones.rows = order
            .iter()
            .map(|&i| self.real_estates_zones.rows[i].clone())
            .collect();
        let sorted_keys: Vec<(MarketId, TypeId, ZoneId)> =
            order.iter().map(|&i| re_keys[i]).collect();

        let mut agents_zones = Table::new(vec!["H_IDX", "I_IDX", "ACC", "ATT"]);
        for &zone in &zone_ids {
            for &agent in &agent_ids {
                agents_zones.push_row(vec![agent.into(), zone.into(), 0.into(), 0.into()]);
            }
        }

        let mut cutoff = Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "DCUTOFF"]);
        let mut subsidies = Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "SUBSIDIES"]);
        for &(market, re_type, zone) in &sorted_keys {
            for (&agent, &agent_market) in agent_ids.iter().zip(&agent_markets) {
                let flag = i64::from(agent_market == market);
                cutoff.push_row(vec![agent.into(), re_type.into(), zone.into(), flag.into()]);
                subsidies.push_row(vec![agent.into(), re_type.into(), zone.into(), 0.into()]);
            }
        }

        self.agents_zones = agents_zones;
        self.demand_exogenous_cutoff = cutoff;
        self.subsidies = subsidies;
        Ok(self)
    }

    /// Minimal well-formed set: 1 zone, 1 type, 1 market, 1 agent.
    /// For use in tests only.
    pub fn default_test() -> Self {
        let mut zones = Table::new(vec!["I_IDX", "AREA"]);
        zones.push_row(vec![1.into(), 10.0.into()]);

        let mut real_estates_zones = Table::new(vec!["V_IDX", "I_IDX", "M_IDX"]);
        real_estates_zones.push_row(vec![1.into(), 1.into(), 1.into()]);

        let mut agents = Table::new(vec!["IDAGENT", "IDMARKET", "UPPERBB"]);
        agents.push_row(vec![1.into(), 1.into(), 0.into()]);

        let mut demand = Table::new(vec!["H_IDX", "DEMAND"]);
        demand.push_row(vec![1.into(), 100.0.into()]);

        let mut supply = Table::new(vec!["V_IDX", "I_IDX", "NREST"]);
        supply.push_row(vec![1.into(), 1.into(), 100.0.into()]);

        let mut bids_adjustments = Table::new(vec!["H_IDX", "V_IDX", "I_IDX", "BIDADJ"]);
        bids_adjustments.push_row(vec![1.into(), 1.into(), 1.into(), 0.into()]);

        let mut rent_adjustments = Table::new(vec!["V_IDX", "I_IDX", "RENTADJ"]);
        rent_adjustments.push_row(vec![1.into(), 1.into(), 0.into()]);

        // Function parameters are opaque to the engine; one row is enough
        // to satisfy the non-empty invariant.
        let mut bids_functions = Table::new(vec!["IDMARKET", "IDAGENT", "IDATTRIB", "PARAM"]);
        bids_functions.push_row(vec![1.into(), 1.into(), 1.into(), 1.0.into()]);
        let mut rent_functions = Table::new(vec!["IDMARKET", "IDATTRIB", "PARAM"]);
        rent_functions.push_row(vec![1.into(), 1.into(), 1.0.into()]);

        let raw = Self {
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
        };
        raw.fill_structure()
            .expect("default test tables are structurally valid")
    }
}

/// Write every input table to `<dir>/<name>.csv`.
pub fn write_all(tables: &TableSet, dir: &Path) -> CalibResult<()> {
    for (name, table) in tables.iter() {
        let path = dir.join(format!("{name}.csv"));
        log::debug!("writing {} rows to {}", table.len(), path.display());
        csv::write_table(&path, table)?;
    }
    Ok(())
}
