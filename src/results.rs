//! Economic results for a solved network: installed capacities, annual energy, levelised costs and
//! the cost of trading with the external grid.
use crate::finance::levelised_cost;
use crate::input::time_series::TIMESTEP;
use crate::network::{AssetID, BusID, Link, Network};
use crate::optimisation::{Solution, budget_used};
use crate::units::{Energy, Money, MoneyPerEnergy, MoneyPerYear, Power};
use log::info;
use serde::Serialize;
use serde_string_enum::SerializeLabeledStringEnum;

/// The kind of a local technology
#[derive(SerializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnologyKind {
    /// A generator
    #[string = "generator"]
    Generator,
    /// A storage unit
    #[string = "storage_unit"]
    StorageUnit,
}

/// Results for one generator or storage unit on the local bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyResult {
    /// Name of the asset
    pub name: AssetID,
    /// Kind of asset
    pub kind: TechnologyKind,
    /// Installed capacity
    pub capacity: Power,
    /// Size of the reservoir (storage only)
    pub energy_capacity: Option<Energy>,
    /// Energy generated or dispatched over the year
    pub annual_energy: Energy,
    /// Inflow to the reservoir over the year (storage only)
    pub annual_inflow: Option<Energy>,
    /// Installed capacity multiplied by unit capex
    pub investment: Money,
    /// Installed capacity multiplied by annualised capital cost
    pub annualised_cost: MoneyPerYear,
    /// LCOE for generators, LCOS for storage
    pub levelised_cost: MoneyPerEnergy,
}

/// System-wide results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSummary {
    /// Total demand on the local bus
    pub total_demand: Energy,
    /// Energy bought from the grid
    pub purchased_energy: Energy,
    /// Cost of energy bought from the grid
    pub purchase_cost: Money,
    /// Energy sold to the grid
    pub sold_energy: Energy,
    /// Revenue from energy sold to the grid, as a non-positive number
    pub sale_revenue: Money,
    /// Purchase cost plus (negative) sale revenue
    pub net_grid_cost: Money,
    /// Solver objective plus the annualised capital cost of fixed-capacity assets
    pub total_annualised_cost: MoneyPerYear,
    /// Cost of meeting all demand by buying from the grid, if there is any import link
    pub grid_only_benchmark: Option<Money>,
    /// Total investment in local technologies
    pub total_investment: Money,
    /// Investment counted against the capex budget
    pub budget_used: Option<Money>,
    /// The capex budget
    pub budget_ceiling: Option<Money>,
}

/// All results for a run
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    /// One entry per local generator and storage unit
    pub technologies: Vec<TechnologyResult>,
    /// System-wide results
    pub summary: SystemSummary,
}

fn total_energy<I>(power: I) -> Energy
where
    I: IntoIterator<Item = Power>,
{
    power.into_iter().map(|power| power * TIMESTEP).sum()
}

/// Energy through a link and its total cost
fn link_totals(solution: &Solution, link: &Link) -> (Energy, Money) {
    let n = solution.network().n_timesteps();
    let Some(flow) = solution.link_flow(&link.name.0) else {
        return (Energy(0.0), Money(0.0));
    };

    flow.zip(link.marginal_cost.iter(n))
        .fold((Energy(0.0), Money(0.0)), |(energy, cost), (flow, price)| {
            let flow = flow * TIMESTEP;
            (energy + flow, cost + price * flow)
        })
}

fn technology_results(solution: &Solution) -> Vec<TechnologyResult> {
    let network = solution.network();
    let local_bus = &network.local_bus;
    let n = network.n_timesteps();
    let mut results = Vec::new();

    for generator in network.generators.iter().filter(|g| &g.bus == local_bus) {
        let capacity = solution.capacity(&generator.key()).unwrap_or_default();
        let output = solution.generator_output(&generator.name.0);
        let annual_energy = total_energy(output.into_iter().flatten());
        let annualised_cost = generator.capital_cost * capacity;
        results.push(TechnologyResult {
            name: generator.name.clone(),
            kind: TechnologyKind::Generator,
            capacity,
            energy_capacity: None,
            annual_energy,
            annual_inflow: None,
            investment: generator.unit_capex * capacity,
            annualised_cost,
            levelised_cost: levelised_cost(annualised_cost, annual_energy),
        });
    }

    for storage in network.storage_units.iter().filter(|s| &s.bus == local_bus) {
        let capacity = solution.capacity(&storage.key()).unwrap_or_default();
        let dispatch = solution.storage_dispatch(&storage.name.0);
        let annual_energy = total_energy(dispatch.into_iter().flatten());
        let annualised_cost = storage.capital_cost * capacity;
        results.push(TechnologyResult {
            name: storage.name.clone(),
            kind: TechnologyKind::StorageUnit,
            capacity,
            energy_capacity: Some(storage.energy_capacity(capacity)),
            annual_energy,
            annual_inflow: Some(total_energy(storage.inflow.iter(n))),
            investment: storage.unit_capex * capacity,
            annualised_cost,
            levelised_cost: levelised_cost(annualised_cost, annual_energy),
        });
    }

    results
}

/// Cost of meeting the demand on the local bus by importing only, at the cheapest import price in
/// each timestep
pub fn grid_only_benchmark(network: &Network) -> Option<Money> {
    let imports: Vec<_> = imports(network).collect();
    if imports.is_empty() {
        return None;
    }

    let benchmark = (0..network.n_timesteps())
        .map(|t| {
            let price = imports
                .iter()
                .map(|link| link.marginal_cost.at(t))
                .reduce(MoneyPerEnergy::min)
                .unwrap_or_default();
            price * (network.demand_at(&network.local_bus, t) * TIMESTEP)
        })
        .sum();

    Some(benchmark)
}

/// Links bringing power onto the local bus from elsewhere
fn imports(network: &Network) -> impl Iterator<Item = &Link> {
    let local_bus: &BusID = &network.local_bus;
    network
        .links
        .iter()
        .filter(move |link| &link.bus1 == local_bus && &link.bus0 != local_bus)
}

/// Links taking power from the local bus elsewhere
fn exports(network: &Network) -> impl Iterator<Item = &Link> {
    let local_bus: &BusID = &network.local_bus;
    network
        .links
        .iter()
        .filter(move |link| &link.bus0 == local_bus && &link.bus1 != local_bus)
}

/// Extract economic results from a solved network
pub fn extract_results(solution: &Solution) -> Results {
    let network = solution.network();
    let technologies = technology_results(solution);

    let (purchased_energy, purchase_cost) = imports(network)
        .map(|link| link_totals(solution, link))
        .fold((Energy(0.0), Money(0.0)), |acc, x| (acc.0 + x.0, acc.1 + x.1));
    let (sold_energy, sale_revenue) = exports(network)
        .map(|link| link_totals(solution, link))
        .fold((Energy(0.0), Money(0.0)), |acc, x| (acc.0 + x.0, acc.1 + x.1));

    let total_demand = total_energy(
        (0..network.n_timesteps()).map(|t| network.demand_at(&network.local_bus, t)),
    );
    let budget = network.budget.as_ref();

    let summary = SystemSummary {
        total_demand,
        purchased_energy,
        purchase_cost,
        sold_energy,
        sale_revenue,
        net_grid_cost: purchase_cost + sale_revenue,
        total_annualised_cost: solution.objective_value + network.fixed_capital_cost(),
        grid_only_benchmark: grid_only_benchmark(network),
        total_investment: technologies.iter().map(|tech| tech.investment).sum(),
        budget_used: budget.map(|budget| budget_used(solution, budget)),
        budget_ceiling: budget.map(|budget| budget.ceiling),
    };

    Results {
        technologies,
        summary,
    }
}

impl Results {
    /// The result for the technology with the given name
    pub fn technology(&self, name: &str) -> Option<&TechnologyResult> {
        self.technologies.iter().find(|tech| &*tech.name.0 == name)
    }

    /// Write a human-readable report to the log
    pub fn log(&self) {
        for tech in &self.technologies {
            info!(
                "{}: capacity {:.4} MW, annual energy {:.2} MWh, investment {:.2} EUR, \
                 levelised cost {:.2} EUR/MWh",
                tech.name,
                tech.capacity.value(),
                tech.annual_energy.value(),
                tech.investment.value(),
                tech.levelised_cost.value()
            );
        }

        let summary = &self.summary;
        info!("Total demand: {:.2} MWh", summary.total_demand.value());
        info!(
            "Purchased from grid: {:.2} MWh for {:.2} EUR",
            summary.purchased_energy.value(),
            summary.purchase_cost.value()
        );
        info!(
            "Sold to grid: {:.2} MWh for {:.2} EUR",
            summary.sold_energy.value(),
            summary.sale_revenue.value()
        );
        info!("Net grid cost: {:.2} EUR", summary.net_grid_cost.value());
        info!(
            "Total annualised system cost: {:.2} EUR/year",
            summary.total_annualised_cost.value()
        );
        if let Some(benchmark) = summary.grid_only_benchmark {
            info!("Grid-only benchmark: {:.2} EUR/year", benchmark.value());
        }
        info!("Total investment: {:.2} EUR", summary.total_investment.value());
        if let (Some(used), Some(ceiling)) = (summary.budget_used, summary.budget_ceiling) {
            info!(
                "Capex budget used: {:.2} of {:.2} EUR",
                used.value(),
                ceiling.value()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::network;
    use crate::optimisation::OptimisationProblem;
    use crate::units::MoneyPerPowerPerYear;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_grid_only_benchmark(network: Network) {
        let n = network.n_timesteps();
        let import = network.link("Grid Import").unwrap();
        let expected: Money = (0..n)
            .map(|t| {
                let demand = network.demand_at(&network.local_bus, t) * TIMESTEP;
                import.marginal_cost.at(t) * demand
            })
            .sum();
        assert_approx_eq!(
            Money,
            grid_only_benchmark(&network).unwrap(),
            expected,
            epsilon = 1e-9
        );
    }

    #[rstest]
    fn test_grid_only_benchmark_no_imports(mut network: Network) {
        network.links.retain(|link| &*link.name.0 != "Grid Import");
        assert!(grid_only_benchmark(&network).is_none());
    }

    #[rstest]
    fn test_extract_results(network: Network) {
        let solution = OptimisationProblem::new(&network)
            .unwrap()
            .solve()
            .unwrap();
        let results = extract_results(&solution);

        // Solar and the reservoir are on the local bus; the slack generator is not
        assert_eq!(results.technologies.len(), 2);
        let solar = results.technology("Solar").unwrap();
        assert_eq!(solar.kind, TechnologyKind::Generator);
        assert!(solar.energy_capacity.is_none());
        assert_approx_eq!(
            MoneyPerYear,
            solar.annualised_cost,
            MoneyPerPowerPerYear(10.0) * solar.capacity,
            epsilon = 1e-9
        );

        let reservoir = results.technology("Reservoir").unwrap();
        assert_eq!(reservoir.kind, TechnologyKind::StorageUnit);
        assert!(reservoir.annual_inflow.unwrap() > Energy(0.0));

        let summary = &results.summary;
        assert!(summary.sale_revenue <= Money(0.0));
        assert!(summary.purchase_cost >= Money(0.0));
        assert_approx_eq!(
            Money,
            summary.net_grid_cost,
            summary.purchase_cost + summary.sale_revenue,
            epsilon = 1e-9
        );
        assert!(summary.budget_used.unwrap() <= summary.budget_ceiling.unwrap());
        assert!(
            summary.total_annualised_cost.value()
                <= summary.grid_only_benchmark.unwrap().value() + 1e-6
        );
    }

    #[rstest]
    fn test_unused_asset_has_zero_levelised_cost(mut network: Network) {
        // Too expensive to build
        network.generators[0].capital_cost = MoneyPerPowerPerYear(1e9);
        let solution = OptimisationProblem::new(&network)
            .unwrap()
            .solve()
            .unwrap();
        let results = extract_results(&solution);
        let solar = results.technology("Solar").unwrap();
        assert_approx_eq!(Power, solar.capacity, Power(0.0), epsilon = 1e-9);
        assert_eq!(solar.levelised_cost, MoneyPerEnergy(0.0));
    }
}
