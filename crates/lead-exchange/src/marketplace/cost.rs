use super::domain::{BudgetBracket, Urgency};

/// Percentages are applied in integer arithmetic so results do not drift with float rounding.
const PERCENT: u64 = 100;
const VERIFIED_DISCOUNT_PERCENT: u64 = 15;
const MINIMUM_COST: u64 = 1;

/// Base credit price per budget bracket.
pub const fn base_cost(bracket: BudgetBracket) -> u64 {
    match bracket {
        BudgetBracket::Under3k => 3,
        BudgetBracket::From3kTo10k => 5,
        BudgetBracket::From10kTo25k => 8,
        BudgetBracket::From25kTo50k => 10,
        BudgetBracket::From50kTo100k => 12,
        BudgetBracket::From100kTo250k => 15,
        BudgetBracket::Over250k => 20,
    }
}

pub const fn urgency_multiplier_percent(urgency: Urgency) -> u64 {
    match urgency {
        Urgency::Emergency => 125,
        Urgency::Urgent => 110,
        Urgency::Flexible => 100,
        Urgency::Planning => 90,
    }
}

/// Credits a professional pays to claim a lead.
///
/// Rounds half up to the nearest credit and never returns less than one.
pub fn cost(bracket: BudgetBracket, urgency: Urgency, verified: bool) -> u64 {
    let discount = if verified {
        PERCENT - VERIFIED_DISCOUNT_PERCENT
    } else {
        PERCENT
    };
    let scale = PERCENT * PERCENT;
    let scaled = base_cost(bracket) * urgency_multiplier_percent(urgency) * discount;
    ((scaled + scale / 2) / scale).max(MINIMUM_COST)
}
