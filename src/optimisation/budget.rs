//! The capex budget, a single constraint coupling the capacities of several kinds of asset.
use super::{Solution, VariableMap};
use crate::model::ConfigurationError;
use crate::network::{Capacity, CapexBudget, Network};
use crate::units::Money;
use highs::RowProblem as Problem;
use log::debug;

/// Add the capex budget constraint.
///
/// Extendable members contribute their capacity variable weighted by unit capex. Fixed members
/// contribute a constant, which is moved to the right-hand side:
///
/// `sum(unit_capex * P) <= ceiling - sum(unit_capex * p_nom)`
///
/// This must be called after all other constraints have been added, so that it is the last row.
pub fn add_budget_constraint(
    problem: &mut Problem,
    variables: &VariableMap,
    network: &Network,
    budget: &CapexBudget,
) -> Result<(), ConfigurationError> {
    let mut committed = Money(0.0);
    let mut terms = Vec::new();
    for member in &budget.members {
        let unknown = || ConfigurationError::UnknownBudgetMember(member.to_string());
        let (capacity, unit_capex) = network.investment_terms(member).ok_or_else(unknown)?;
        match capacity {
            Capacity::Fixed(p_nom) => committed += unit_capex * p_nom,
            Capacity::Extendable { .. } => {
                let var = variables.get_capacity_var(member).ok_or_else(unknown)?;
                terms.push((var, unit_capex.value()));
            }
        }
    }

    // If committed capex already exceeds the ceiling the problem is infeasible, which is reported
    // by the solver
    let remaining = budget.ceiling - committed;
    debug!(
        "Capex budget of {} with {} already committed to fixed assets",
        budget.ceiling, committed
    );
    problem.add_row(..=remaining.value(), terms);

    Ok(())
}

/// Total investment in the members of the budget for the solved capacities
pub fn budget_used(solution: &Solution, budget: &CapexBudget) -> Money {
    let network = solution.network();
    budget
        .members
        .iter()
        .filter_map(|member| {
            let (_, unit_capex) = network.investment_terms(member)?;
            Some(unit_capex * solution.capacity(member)?)
        })
        .sum()
}
