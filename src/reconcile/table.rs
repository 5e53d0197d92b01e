use super::outcome::Action;
use crate::store::models::RequestRecord;

/// Guard evaluated against the mirror record and its on-chain counterpart
pub type Predicate<C> = fn(&RequestRecord, &C) -> bool;

pub struct Rule<C> {
    pub action: Action,
    pub when: Predicate<C>,
}

impl<C> Rule<C> {
    pub const fn new(action: Action, when: Predicate<C>) -> Self {
        Self { action, when }
    }
}

/// Ordered dispatch table. The first matching rule wins; a `NoOp` default
/// always closes the table.
pub struct ConditionTable<C> {
    rules: Vec<Rule<C>>,
}

impl<C> ConditionTable<C> {
    pub fn new(rules: impl IntoIterator<Item = Rule<C>>) -> Self {
        let mut rules: Vec<Rule<C>> = rules.into_iter().collect();
        rules.push(Rule::new(Action::NoOp, |_, _| true));
        Self { rules }
    }

    pub fn classify(&self, record: &RequestRecord, counterpart: &C) -> Action {
        self.rules
            .iter()
            .find(|rule| (rule.when)(record, counterpart))
            .map(|rule| rule.action)
            .unwrap_or(Action::NoOp)
    }

    /// Actions in evaluation order, default included
    pub fn actions(&self) -> Vec<Action> {
        self.rules.iter().map(|rule| rule.action).collect()
    }
}
