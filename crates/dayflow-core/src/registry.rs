//! Step -> handler table, validated once at startup.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::flow::{Flow, FlowId, Step, StepSpec, Trigger};

struct Registered {
    flow: Arc<dyn Flow>,
    spec: StepSpec,
}

/// Maps every step to the flow that handles it.
pub struct FlowRegistry {
    steps: HashMap<Step, Registered>,
}

impl FlowRegistry {
    /// Build a registry from `flows` and check the graph.
    ///
    /// # Errors
    ///
    /// Fails when a step is declared twice, a successor is unknown, a flow
    /// does not have exactly one entry step, or some step has no path to a
    /// terminal step.
    pub fn new(flows: Vec<Arc<dyn Flow>>) -> Result<Self, RegistryError> {
        let mut steps = HashMap::new();
        let mut entries: Vec<(FlowId, usize)> = Vec::new();

        for flow in &flows {
            let mut entry_count = 0;
            for spec in flow.steps() {
                if spec.entry {
                    entry_count += 1;
                }
                let registered = Registered {
                    flow: Arc::clone(flow),
                    spec: *spec,
                };
                if steps.insert(spec.step, registered).is_some() {
                    return Err(RegistryError::DuplicateStep(spec.step));
                }
            }
            entries.push((flow.id(), entry_count));
        }

        if let Some((flow, count)) = entries.into_iter().find(|(_, count)| *count != 1) {
            return Err(RegistryError::EntryCount {
                flow: flow.to_string(),
                count,
            });
        }

        let registry = Self { steps };
        registry.check_successors(&flows)?;
        registry.check_terminal_paths(&flows)?;
        Ok(registry)
    }

    /// Registry over every built-in flow, which must cover all steps.
    pub fn standard() -> Result<Self, RegistryError> {
        let registry = Self::new(crate::flows::all())?;
        if let Some(step) = Step::ALL
            .iter()
            .find(|s| **s != Step::Idle && !registry.steps.contains_key(*s))
        {
            return Err(RegistryError::MissingStep(*step));
        }
        Ok(registry)
    }

    fn check_successors(&self, flows: &[Arc<dyn Flow>]) -> Result<(), RegistryError> {
        for spec in flows.iter().flat_map(|f| f.steps()) {
            if let Some(to) = spec.next.iter().find(|to| !self.steps.contains_key(*to)) {
                return Err(RegistryError::UnknownSuccessor {
                    from: spec.step,
                    to: *to,
                });
            }
        }
        Ok(())
    }

    /// Walks successor edges backwards from terminal steps.
    fn check_terminal_paths(&self, flows: &[Arc<dyn Flow>]) -> Result<(), RegistryError> {
        let mut predecessors: HashMap<Step, Vec<Step>> = HashMap::new();
        for spec in self.steps.values().map(|r| &r.spec) {
            for to in spec.next {
                predecessors.entry(*to).or_default().push(spec.step);
            }
        }

        let mut can_finish: HashSet<Step> = HashSet::new();
        let mut queue: VecDeque<Step> = self
            .steps
            .values()
            .filter(|r| r.spec.terminal)
            .map(|r| r.spec.step)
            .collect();
        while let Some(step) = queue.pop_front() {
            if !can_finish.insert(step) {
                continue;
            }
            if let Some(before) = predecessors.get(&step) {
                queue.extend(before.iter().copied());
            }
        }

        // Declaration order keeps the reported step deterministic.
        match flows
            .iter()
            .flat_map(|f| f.steps())
            .find(|spec| !can_finish.contains(&spec.step))
        {
            Some(spec) => Err(RegistryError::NoPathToTerminal(spec.step)),
            None => Ok(()),
        }
    }

    /// Handler for `step` if the step accepts `trigger`.
    pub fn resolve(&self, step: Step, trigger: Trigger) -> Option<(&Arc<dyn Flow>, &StepSpec)> {
        self.steps
            .get(&step)
            .filter(|r| r.spec.accepts(trigger))
            .map(|r| (&r.flow, &r.spec))
    }

    pub fn flow_of(&self, step: Step) -> Option<FlowId> {
        self.steps.get(&step).map(|r| r.flow.id())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::flow::{FlowContext, Transition};
    use async_trait::async_trait;

    struct Table(FlowId, &'static [StepSpec]);

    #[async_trait]
    impl Flow for Table {
        fn id(&self) -> FlowId {
            self.0
        }

        fn steps(&self) -> &'static [StepSpec] {
            self.1
        }

        async fn handle(&self, _: Step, _: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
            Ok(Transition::End)
        }
    }

    fn table(id: FlowId, steps: &'static [StepSpec]) -> Arc<dyn Flow> {
        Arc::new(Table(id, steps))
    }

    const TEXT: &[Trigger] = &[Trigger::Text];

    #[test]
    fn standard_registry_is_valid_and_complete() {
        let registry = FlowRegistry::standard().unwrap();
        assert_eq!(registry.len(), Step::ALL.len() - 1);
        assert_eq!(registry.flow_of(Step::NightPickTime), Some(FlowId::Night));
        assert!(registry.resolve(Step::NightPickTime, Trigger::Text).is_some());
        assert!(registry.resolve(Step::NightPickTime, Trigger::Button).is_none());
        assert!(registry.resolve(Step::Idle, Trigger::Text).is_none());
    }

    #[test]
    fn duplicate_step_is_rejected() {
        static A: &[StepSpec] = &[StepSpec::new(Step::TaskTitle, TEXT, &[]).entry().terminal()];
        let err = FlowRegistry::new(vec![table(FlowId::Task, A), table(FlowId::Event, A)])
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateStep(Step::TaskTitle));
    }

    #[test]
    fn unknown_successor_is_rejected() {
        static A: &[StepSpec] =
            &[StepSpec::new(Step::TaskTitle, TEXT, &[Step::TaskDeadline]).entry().terminal()];
        let err = FlowRegistry::new(vec![table(FlowId::Task, A)]).err().unwrap();
        assert_eq!(
            err,
            RegistryError::UnknownSuccessor {
                from: Step::TaskTitle,
                to: Step::TaskDeadline
            }
        );
    }

    #[test]
    fn flow_needs_exactly_one_entry() {
        static A: &[StepSpec] = &[
            StepSpec::new(Step::TaskTitle, TEXT, &[]).entry().terminal(),
            StepSpec::new(Step::TaskDeadline, TEXT, &[]).entry().terminal(),
        ];
        let err = FlowRegistry::new(vec![table(FlowId::Task, A)]).err().unwrap();
        assert_eq!(
            err,
            RegistryError::EntryCount {
                flow: "task".into(),
                count: 2
            }
        );
    }

    #[test]
    fn cycle_without_exit_is_rejected() {
        static A: &[StepSpec] = &[
            StepSpec::new(Step::TaskTitle, TEXT, &[Step::TaskDeadline, Step::TaskDuration])
                .entry(),
            StepSpec::new(Step::TaskDeadline, TEXT, &[Step::TaskDuration]),
            StepSpec::new(Step::TaskDuration, TEXT, &[Step::TaskDeadline]),
            StepSpec::new(Step::TaskCreation, TEXT, &[]).terminal(),
        ];
        let err = FlowRegistry::new(vec![table(FlowId::Task, A)]).err().unwrap();
        assert_eq!(err, RegistryError::NoPathToTerminal(Step::TaskTitle));
    }
}
