//! Code for building and solving the capacity expansion and dispatch problem.
//!
//! The whole year is optimised at once as a single linear program. Capacities of extendable
//! assets are decision variables alongside the hourly operation of every asset, and the objective
//! is the total annualised cost of the system.
use crate::network::{AssetID, AssetKey, BusID, Capacity, Network};
use crate::units::{Energy, MoneyPerEnergy, MoneyPerYear, Power};
use anyhow::{Context, Result};
use highs::{HighsModelStatus, HighsStatus, RowProblem as Problem, Sense};
use indexmap::IndexMap;
use itertools::Either;
use log::{Level, debug, log_enabled};
use std::error::Error;
use std::fmt;
use std::iter;
use std::ops::{Range, RangeInclusive};

mod budget;
mod constraints;
pub use budget::budget_used;
use budget::add_budget_constraint;
use constraints::{ConstraintKeys, add_model_constraints};

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
type Variable = highs::Col;

/// Bounds for a variable which is only limited by constraints
const FREE: RangeInclusive<f64> = f64::NEG_INFINITY..=f64::INFINITY;

/// The columns for a quantity which takes a value in every timestep
#[derive(Debug)]
struct SeriesVariables {
    vars: Vec<Variable>,
    idx: Range<usize>,
}

impl SeriesVariables {
    /// Add one column per timestep with the given costs and bounds
    fn add<I>(problem: &mut Problem, columns: I) -> Self
    where
        I: IntoIterator<Item = (f64, RangeInclusive<f64>)>,
    {
        // This line **must** come before we add more variables
        let start = problem.num_cols();

        let vars = columns
            .into_iter()
            .map(|(cost, bounds)| problem.add_column(cost, bounds))
            .collect();

        Self {
            vars,
            idx: start..problem.num_cols(),
        }
    }
}

/// The columns for the operation of a storage unit
#[derive(Debug)]
struct StorageVariables {
    dispatch: SeriesVariables,
    store: SeriesVariables,
    soc: SeriesVariables,
    /// Only present for storage units which receive inflow
    spill: Option<SeriesVariables>,
}

/// A map for easy lookup of variables in the problem.
///
/// We use this data structure for two things:
///
/// 1. In order define constraints for the optimisation
/// 2. To keep track of the combination of parameters that each variable corresponds to, for when we
///    are reading the results of the optimisation.
#[derive(Debug)]
pub struct VariableMap {
    capacity_vars: IndexMap<AssetKey, Variable>,
    capacity_var_idx: Range<usize>,
    generator_vars: IndexMap<AssetID, SeriesVariables>,
    storage_vars: IndexMap<AssetID, StorageVariables>,
    link_vars: IndexMap<AssetID, SeriesVariables>,
}

/// Bounds for a capacity variable
fn capacity_bounds(min: Power, max: Option<Power>) -> RangeInclusive<f64> {
    min.value()..=max.map_or(f64::INFINITY, Power::value)
}

impl VariableMap {
    /// Create a new [`VariableMap`], adding all variables to the problem.
    ///
    /// Capacity variables come first, followed by the per-timestep variables for generators,
    /// storage units and links.
    fn new(problem: &mut Problem, network: &Network) -> Self {
        let n = network.n_timesteps();
        let mut variables = Self {
            capacity_vars: IndexMap::new(),
            capacity_var_idx: Range::default(),
            generator_vars: IndexMap::new(),
            storage_vars: IndexMap::new(),
            link_vars: IndexMap::new(),
        };

        // This line **must** come before we add more variables
        let start = problem.num_cols();
        let generators = network
            .generators
            .iter()
            .map(|generator| (generator.key(), generator.capacity, generator.capital_cost));
        let storage_units = network
            .storage_units
            .iter()
            .map(|storage| (storage.key(), storage.capacity, storage.capital_cost));
        for (key, capacity, capital_cost) in generators.chain(storage_units) {
            if let Capacity::Extendable { min, max } = capacity {
                let var = problem.add_column(capital_cost.value(), capacity_bounds(min, max));
                let existing = variables.capacity_vars.insert(key, var).is_some();
                assert!(!existing, "Duplicate entry for var");
            }
        }
        variables.capacity_var_idx = start..problem.num_cols();

        for generator in &network.generators {
            let columns = (0..n).map(|t| {
                let cost = generator.marginal_cost.at(t).value();
                let bounds = match generator.capacity {
                    Capacity::Fixed(p_nom) => {
                        (p_nom * generator.p_min_pu.at(t)).value()
                            ..=(p_nom * generator.p_max_pu.at(t)).value()
                    }
                    // Limited by capacity constraints instead
                    Capacity::Extendable { .. } => FREE,
                };
                (cost, bounds)
            });
            let vars = SeriesVariables::add(problem, columns);
            variables
                .generator_vars
                .insert(generator.name.clone(), vars);
        }

        for storage in &network.storage_units {
            // A reservoir with no energy capacity cannot be charged or discharged
            let no_throughput = storage.max_hours.value() <= 0.0;
            let (dispatch_max, store_max, soc_max) = match storage.capacity {
                Capacity::Fixed(p_nom) => (
                    (p_nom * storage.p_max_pu).value(),
                    (p_nom * -storage.p_min_pu).value(),
                    storage.energy_capacity(p_nom).value(),
                ),
                Capacity::Extendable { .. } => (f64::INFINITY, f64::INFINITY, f64::INFINITY),
            };
            let (dispatch_max, store_max) = if no_throughput {
                (0.0, 0.0)
            } else {
                (dispatch_max, store_max)
            };

            let dispatch = SeriesVariables::add(
                problem,
                (0..n).map(|t| (storage.marginal_cost.at(t).value(), 0.0..=dispatch_max)),
            );
            let store = SeriesVariables::add(problem, (0..n).map(|_| (0.0, 0.0..=store_max)));
            let soc = SeriesVariables::add(problem, (0..n).map(|_| (0.0, 0.0..=soc_max)));
            let spill = storage.has_inflow().then(|| {
                SeriesVariables::add(
                    problem,
                    storage
                        .inflow
                        .iter(n)
                        .map(|inflow| (0.0, 0.0..=inflow.value())),
                )
            });

            variables.storage_vars.insert(
                storage.name.clone(),
                StorageVariables {
                    dispatch,
                    store,
                    soc,
                    spill,
                },
            );
        }

        for link in &network.links {
            let bounds = (link.p_nom * link.p_min_pu).value()..=(link.p_nom * link.p_max_pu).value();
            let columns = link
                .marginal_cost
                .iter(n)
                .map(|cost| (cost.value(), bounds.clone()));
            let vars = SeriesVariables::add(problem, columns);
            variables.link_vars.insert(link.name.clone(), vars);
        }

        variables
    }

    /// Get the capacity [`Variable`] for an asset, if its capacity is extendable
    fn get_capacity_var(&self, key: &AssetKey) -> Option<Variable> {
        self.capacity_vars.get(key).copied()
    }
}

/// The possible outcomes of an unsuccessful solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// No solution satisfies all the constraints
    Infeasible,
    /// The objective can be decreased without limit
    Unbounded,
    /// The solver failed for some other reason
    NumericalError,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::NumericalError => "numerical_error",
        };
        write!(f, "{status}")
    }
}

/// Indicates that the solver did not find an optimal solution
#[derive(Debug, Clone, PartialEq)]
pub struct SolverStatusError {
    /// The status of the solve
    pub status: SolverStatus,
    /// The condition reported by the solver
    pub condition: String,
}

impl fmt::Display for SolverStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Solver terminated with status {} (condition: {})",
            self.status, self.condition
        )
    }
}

impl Error for SolverStatusError {}

impl From<HighsStatus> for SolverStatusError {
    fn from(status: HighsStatus) -> Self {
        Self {
            status: SolverStatus::NumericalError,
            condition: format!("{status:?}"),
        }
    }
}

impl From<HighsModelStatus> for SolverStatusError {
    fn from(status: HighsModelStatus) -> Self {
        let kind = match status {
            // Presolve can report this when the constraints contradict one another; the objective
            // is bounded below for any network that can be built from a model
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                SolverStatus::Infeasible
            }
            HighsModelStatus::Unbounded => SolverStatus::Unbounded,
            _ => SolverStatus::NumericalError,
        };

        Self {
            status: kind,
            condition: format!("{status:?}"),
        }
    }
}

/// Try to solve the model, returning an error if the model is incoherent or result is non-optimal
pub fn solve_optimal(model: highs::Model) -> Result<highs::SolvedModel, SolverStatusError> {
    let solved = model.try_solve()?;

    match solved.status() {
        HighsModelStatus::Optimal => Ok(solved),
        status => Err(status.into()),
    }
}

/// The assembled linear program for a network, ready to be solved
pub struct OptimisationProblem<'a> {
    network: &'a Network,
    problem: Problem,
    variables: VariableMap,
    constraint_keys: ConstraintKeys,
}

impl<'a> OptimisationProblem<'a> {
    /// Build the linear program for the given network.
    ///
    /// The capex budget constraint is added last, after all the variables it refers to.
    pub fn new(network: &'a Network) -> Result<Self> {
        network.validate()?;

        let mut problem = Problem::default();
        let variables = VariableMap::new(&mut problem, network);
        let constraint_keys = add_model_constraints(&mut problem, &variables, network);
        if let Some(budget) = &network.budget {
            add_budget_constraint(&mut problem, &variables, network, budget)
                .context("Could not add capex budget constraint")?;
        }

        debug!(
            "Optimisation problem has {} variables and {} constraints",
            problem.num_cols(),
            problem.num_rows()
        );

        Ok(Self {
            network,
            problem,
            variables,
            constraint_keys,
        })
    }

    /// The number of variables in the problem
    pub fn num_cols(&self) -> usize {
        self.problem.num_cols()
    }

    /// The number of constraints in the problem
    pub fn num_rows(&self) -> usize {
        self.problem.num_rows()
    }

    /// Solve the problem.
    ///
    /// There is no retry: any status other than optimal is returned as an error and no partial
    /// results are available.
    pub fn solve(self) -> Result<Solution<'a>, SolverStatusError> {
        let mut model = self.problem.optimise(Sense::Minimise);
        model.set_option("output_flag", log_enabled!(Level::Debug));

        let solved = solve_optimal(model)?;
        Ok(Solution {
            network: self.network,
            objective_value: MoneyPerYear(solved.objective_value()),
            solution: solved.get_solution(),
            variables: self.variables,
            constraint_keys: self.constraint_keys,
        })
    }
}

/// The solution to the optimisation problem
#[derive(Debug)]
pub struct Solution<'a> {
    network: &'a Network,
    solution: highs::Solution,
    variables: VariableMap,
    constraint_keys: ConstraintKeys,
    /// The objective value for the solution.
    ///
    /// This does not include the capital cost of assets with fixed capacity.
    pub objective_value: MoneyPerYear,
}

impl<'a> Solution<'a> {
    /// The network which was optimised
    pub fn network(&self) -> &'a Network {
        self.network
    }

    fn values(&self, vars: &SeriesVariables) -> impl Iterator<Item = f64> + '_ {
        self.solution.columns()[vars.idx.clone()].iter().copied()
    }

    /// Iterate over the solved capacities of extendable assets
    pub fn iter_capacity(&self) -> impl Iterator<Item = (&AssetKey, Power)> {
        self.variables
            .capacity_vars
            .keys()
            .zip(self.solution.columns()[self.variables.capacity_var_idx.clone()].iter())
            .map(|(key, capacity)| (key, Power(*capacity)))
    }

    /// Total capacity chosen by the optimisation across all extendable assets
    pub fn total_extendable_capacity(&self) -> Power {
        self.iter_capacity().map(|(_, capacity)| capacity).sum()
    }

    /// The installed capacity of an asset, whether fixed or chosen by the optimisation
    pub fn capacity(&self, key: &AssetKey) -> Option<Power> {
        if let Some(idx) = self.variables.capacity_vars.get_index_of(key) {
            let col = self.variables.capacity_var_idx.start + idx;
            return Some(Power(self.solution.columns()[col]));
        }

        match key {
            AssetKey::Generator(name) => self
                .network
                .generator(&name.0)
                .and_then(|generator| generator.capacity.fixed_value()),
            AssetKey::StorageUnit(name) => self
                .network
                .storage_unit(&name.0)
                .and_then(|storage| storage.capacity.fixed_value()),
            AssetKey::Link(name) => self.network.link(&name.0).map(|link| link.p_nom),
        }
    }

    /// Output of a generator in each timestep
    pub fn generator_output(&self, name: &str) -> Option<impl Iterator<Item = Power> + '_> {
        let vars = self.variables.generator_vars.get(name)?;
        Some(self.values(vars).map(Power))
    }

    /// Power discharged by a storage unit in each timestep
    pub fn storage_dispatch(&self, name: &str) -> Option<impl Iterator<Item = Power> + '_> {
        let vars = self.variables.storage_vars.get(name)?;
        Some(self.values(&vars.dispatch).map(Power))
    }

    /// Power used to charge a storage unit in each timestep
    pub fn storage_store(&self, name: &str) -> Option<impl Iterator<Item = Power> + '_> {
        let vars = self.variables.storage_vars.get(name)?;
        Some(self.values(&vars.store).map(Power))
    }

    /// State of charge of a storage unit at the end of each timestep
    pub fn storage_soc(&self, name: &str) -> Option<impl Iterator<Item = Energy> + '_> {
        let vars = self.variables.storage_vars.get(name)?;
        Some(self.values(&vars.soc).map(Energy))
    }

    /// Inflow spilled by a storage unit in each timestep (zero if it has no inflow)
    pub fn storage_spill(&self, name: &str) -> Option<impl Iterator<Item = Power> + '_> {
        let vars = self.variables.storage_vars.get(name)?;
        let spill = match &vars.spill {
            Some(spill) => Either::Left(self.values(spill).map(Power)),
            None => Either::Right(iter::repeat_n(Power(0.0), self.network.n_timesteps())),
        };
        Some(spill)
    }

    /// Flow through a link from `bus0` to `bus1` in each timestep
    pub fn link_flow(&self, name: &str) -> Option<impl Iterator<Item = Power> + '_> {
        let vars = self.variables.link_vars.get(name)?;
        Some(self.values(vars).map(Power))
    }

    /// Keys and dual values for power balance constraints.
    ///
    /// The dual is the marginal cost of supplying one more MWh to the bus in that timestep.
    pub fn iter_power_balance_duals(
        &self,
    ) -> impl Iterator<Item = (&BusID, usize, MoneyPerEnergy)> {
        self.constraint_keys
            .power_balance_keys
            .zip_duals::<MoneyPerEnergy>(self.solution.dual_rows())
            .map(|((bus, timestep), price)| (bus, *timestep, price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::network;
    use crate::network::{Profile, StorageUnit};
    use crate::units::{Dimensionless, Hours, Money, MoneyPerPower, MoneyPerPowerPerYear};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn solve(network: &Network) -> Solution<'_> {
        OptimisationProblem::new(network).unwrap().solve().unwrap()
    }

    #[rstest]
    fn test_problem_size(network: Network) {
        let problem = OptimisationProblem::new(&network).unwrap();

        // One extendable generator (solar), one storage unit with inflow and two links
        let n = network.n_timesteps();
        assert_eq!(problem.num_cols(), 1 + 2 * n + 4 * n + 2 * n);
        assert!(problem.num_rows() >= 2 * n);
    }

    #[rstest]
    fn test_power_balance(network: Network) {
        let solution = solve(&network);
        let bus = &network.local_bus;

        let solar: Vec<_> = solution.generator_output("Solar").unwrap().collect();
        let dispatch: Vec<_> = solution.storage_dispatch("Reservoir").unwrap().collect();
        let store: Vec<_> = solution.storage_store("Reservoir").unwrap().collect();
        let import: Vec<_> = solution.link_flow("Grid Import").unwrap().collect();
        let export: Vec<_> = solution.link_flow("Grid Export").unwrap().collect();
        for t in 0..network.n_timesteps() {
            let supply = solar[t] + dispatch[t] - store[t] + import[t] - export[t];
            assert_approx_eq!(Power, supply, network.demand_at(bus, t), epsilon = 1e-6);
        }
    }

    #[rstest]
    fn test_storage_bounds_and_closure(network: Network) {
        let solution = solve(&network);
        let reservoir = network.storage_unit("Reservoir").unwrap();
        let p_nom = solution
            .capacity(&AssetKey::StorageUnit(reservoir.name.clone()))
            .unwrap();
        let soc: Vec<_> = solution.storage_soc("Reservoir").unwrap().collect();

        let max = reservoir.energy_capacity(p_nom);
        for value in &soc {
            assert!(*value >= Energy(-1e-9));
            assert!(*value <= max + Energy(1e-9));
        }
        assert_approx_eq!(Energy, soc[0], *soc.last().unwrap(), epsilon = 1e-6);
    }

    #[rstest]
    fn test_zero_max_hours_no_throughput(mut network: Network) {
        network.storage_units.push(StorageUnit {
            name: "Empty".into(),
            bus: network.local_bus.clone(),
            capacity: Capacity::Fixed(Power(5.0)),
            capital_cost: MoneyPerPowerPerYear(0.0),
            unit_capex: MoneyPerPower(0.0),
            marginal_cost: Profile::Constant(MoneyPerEnergy(-10.0)),
            p_min_pu: Dimensionless(-1.0),
            p_max_pu: Dimensionless(1.0),
            max_hours: Hours(0.0),
            inflow: Profile::Constant(Power(0.0)),
            cyclic_soc: false,
        });

        let solution = solve(&network);
        assert!(solution.storage_dispatch("Empty").unwrap().all(|p| p == Power(0.0)));
        assert!(solution.storage_store("Empty").unwrap().all(|p| p == Power(0.0)));
    }

    #[rstest]
    fn test_capacity_fixed_and_extendable(network: Network) {
        let solution = solve(&network);
        assert_eq!(
            solution.capacity(&AssetKey::Link("Grid Import".into())),
            Some(network.link("Grid Import").unwrap().p_nom)
        );
        assert_eq!(solution.iter_capacity().count(), 1);
        assert!(solution.capacity(&AssetKey::Generator("Missing".into())).is_none());
    }

    #[rstest]
    fn test_budget_limits_capacity(mut network: Network) {
        let solution = solve(&network);
        let unconstrained = solution
            .capacity(&AssetKey::Generator("Solar".into()))
            .unwrap();
        assert!(unconstrained > Power(0.0));

        let budget = network.budget.as_mut().unwrap();
        budget.ceiling = Money(unconstrained.value() * 1000.0 / 2.0);
        let solution = solve(&network);
        let constrained = solution
            .capacity(&AssetKey::Generator("Solar".into()))
            .unwrap();
        assert_approx_eq!(Power, constrained, unconstrained * Dimensionless(0.5), epsilon = 1e-6);
    }

    #[rstest]
    fn test_infeasible_budget(mut network: Network) {
        // A fixed-capacity member which alone costs more than the budget
        network.storage_units[0].capacity = Capacity::Fixed(Power(1.0));
        network.storage_units[0].unit_capex = MoneyPerPower(1e6);
        network.budget.as_mut().unwrap().ceiling = Money(10.0);

        let err = OptimisationProblem::new(&network)
            .unwrap()
            .solve()
            .err()
            .unwrap();
        assert_eq!(err.status, SolverStatus::Infeasible);
    }

    #[test]
    fn test_solver_status_from_model_status() {
        let err: SolverStatusError = HighsModelStatus::Unbounded.into();
        assert_eq!(err.status, SolverStatus::Unbounded);
        let err: SolverStatusError = HighsModelStatus::Infeasible.into();
        assert_eq!(err.status, SolverStatus::Infeasible);
        assert_eq!(err.condition, "Infeasible");
        let err: SolverStatusError = HighsModelStatus::ReachedTimeLimit.into();
        assert_eq!(err.status, SolverStatus::NumericalError);
    }
}
