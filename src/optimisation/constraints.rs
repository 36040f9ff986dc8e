//! Code for adding constraints to the capacity expansion and dispatch problem.
use super::{SeriesVariables, Variable, VariableMap};
use crate::network::{BusID, Network};
use highs::RowProblem as Problem;

/// Corresponding variables for a constraint along with the row offset in the solution
#[derive(Debug)]
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the corresponding dual values in the solution, accounting for the offset
    pub fn zip_duals<'a, U>(&'a self, duals: &'a [f64]) -> impl Iterator<Item = (&'a T, U)>
    where
        U: From<f64>,
    {
        assert!(
            self.offset + self.keys.len() <= duals.len(),
            "Bad constraint keys: dual rows out of range"
        );

        self.keys
            .iter()
            .zip(duals[self.offset..].iter().copied().map(U::from))
    }
}

/// Indicates the bus and timestep covered by each power balance constraint
pub type PowerBalanceKeys = KeysWithOffset<(BusID, usize)>;

/// The keys for different constraints
#[derive(Debug)]
pub struct ConstraintKeys {
    /// Keys for power balance constraints
    pub power_balance_keys: PowerBalanceKeys,
}

/// Add the constraints for the physics of the network.
///
/// Note: the ordering of constraints is important, as the dual values of the power balance
/// constraints are later retrieved to calculate marginal prices on each bus.
///
/// # Arguments:
///
/// * `problem` - The optimisation problem
/// * `variables` - The variables in the problem
/// * `network` - The network being optimised
///
/// # Returns:
///
/// Keys for the power balance constraints.
pub fn add_model_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) -> ConstraintKeys {
    let power_balance_keys = add_power_balance_constraints(problem, variables, network);
    add_generator_capacity_constraints(problem, variables, network);
    add_storage_capacity_constraints(problem, variables, network);
    add_storage_dynamics_constraints(problem, variables, network);

    ConstraintKeys { power_balance_keys }
}

/// Add one equality per bus per timestep.
///
/// Generation, storage discharge and link inflow are positive; storage charging and link outflow
/// are negative. The right-hand side is the total load on the bus.
fn add_power_balance_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) -> PowerBalanceKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let mut keys = Vec::new();
    for bus in &network.buses {
        let mut injections: Vec<(&SeriesVariables, f64)> = Vec::new();
        for generator in network.generators.iter().filter(|g| &g.bus == bus) {
            injections.push((&variables.generator_vars[&generator.name], 1.0));
        }
        for storage in network.storage_units.iter().filter(|s| &s.bus == bus) {
            let vars = &variables.storage_vars[&storage.name];
            injections.push((&vars.dispatch, 1.0));
            injections.push((&vars.store, -1.0));
        }
        for link in &network.links {
            let vars = &variables.link_vars[&link.name];
            if &link.bus1 == bus {
                injections.push((vars, 1.0));
            }
            if &link.bus0 == bus {
                injections.push((vars, -1.0));
            }
        }

        for t in 0..network.n_timesteps() {
            let demand = network.demand_at(bus, t).value();
            let terms = injections
                .iter()
                .map(|(vars, coeff)| (vars.vars[t], *coeff));
            problem.add_row(demand..=demand, terms);
            keys.push((bus.clone(), t));
        }
    }

    PowerBalanceKeys { offset, keys }
}

/// Add rows limiting per-timestep operation by a capacity variable.
///
/// For each timestep the row is `var - factor * capacity <= 0`.
fn add_capacity_rows<I>(problem: &mut Problem, capacity_var: Variable, terms: I)
where
    I: IntoIterator<Item = (Variable, f64)>,
{
    for (var, factor) in terms {
        problem.add_row(..=0.0, [(var, 1.0), (capacity_var, -factor)]);
    }
}

/// Limit generator output to the extendable capacity scaled by its availability
fn add_generator_capacity_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) {
    for generator in &network.generators {
        let Some(capacity_var) = variables.get_capacity_var(&generator.key()) else {
            continue;
        };
        let vars = &variables.generator_vars[&generator.name];

        // p_t <= p_max_pu * P
        let upper = vars
            .vars
            .iter()
            .zip(generator.p_max_pu.iter(vars.vars.len()))
            .map(|(var, p_max_pu)| (*var, p_max_pu.value()));
        add_capacity_rows(problem, capacity_var, upper);

        // -p_t <= -p_min_pu * P
        for (var, p_min_pu) in vars.vars.iter().zip(generator.p_min_pu.iter(vars.vars.len())) {
            problem.add_row(..=0.0, [(*var, -1.0), (capacity_var, p_min_pu.value())]);
        }
    }
}

/// Limit charging, discharging and the state of charge of storage with extendable capacity
fn add_storage_capacity_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) {
    for storage in &network.storage_units {
        let Some(capacity_var) = variables.get_capacity_var(&storage.key()) else {
            continue;
        };
        let vars = &variables.storage_vars[&storage.name];

        let p_max_pu = storage.p_max_pu.value();
        let store_pu = (-storage.p_min_pu).value();
        let max_hours = storage.max_hours.value();
        let dispatch = vars.dispatch.vars.iter().map(|var| (*var, p_max_pu));
        let store = vars.store.vars.iter().map(|var| (*var, store_pu));
        let soc = vars.soc.vars.iter().map(|var| (*var, max_hours));
        add_capacity_rows(problem, capacity_var, dispatch.chain(store).chain(soc));
    }
}

/// Add the state of charge balance for every storage unit.
///
/// `soc_t - soc_{t-1} - store_t + dispatch_t + spill_t = inflow_t`
///
/// At the first timestep, non-cyclic storage starts empty. Cyclic storage takes the state of charge
/// at the last timestep as its previous state and must also end where it starts.
fn add_storage_dynamics_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
) {
    let n = network.n_timesteps();
    for storage in &network.storage_units {
        let vars = &variables.storage_vars[&storage.name];
        let soc = &vars.soc.vars;
        let wraps = storage.cyclic_soc && n > 1;

        for (t, inflow) in storage.inflow.iter(n).enumerate() {
            let mut terms = vec![
                (soc[t], 1.0),
                (vars.store.vars[t], -1.0),
                (vars.dispatch.vars[t], 1.0),
            ];
            if t > 0 {
                terms.push((soc[t - 1], -1.0));
            } else if wraps {
                terms.push((soc[n - 1], -1.0));
            }
            if let Some(spill) = &vars.spill {
                terms.push((spill.vars[t], 1.0));
            }

            let inflow = inflow.value();
            problem.add_row(inflow..=inflow, terms);
        }

        if wraps {
            problem.add_row(0.0..=0.0, [(soc[0], 1.0), (soc[n - 1], -1.0)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::MoneyPerEnergy;

    #[test]
    fn test_zip_duals() {
        let keys = KeysWithOffset {
            offset: 1,
            keys: vec!["a", "b"],
        };
        let duals = [9.0, 1.0, 2.0, 3.0];
        let zipped: Vec<(&&str, MoneyPerEnergy)> = keys.zip_duals(&duals).collect();
        assert_eq!(
            zipped,
            [(&"a", MoneyPerEnergy(1.0)), (&"b", MoneyPerEnergy(2.0))]
        );
    }

    #[test]
    #[should_panic(expected = "dual rows out of range")]
    fn test_zip_duals_out_of_range() {
        let keys = KeysWithOffset {
            offset: 3,
            keys: vec!["a", "b"],
        };
        let duals = [1.0, 2.0, 3.0];
        let _ = keys.zip_duals::<f64>(&duals).count();
    }
}
