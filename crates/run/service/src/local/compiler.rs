//! Dependency-ordered compilation of workflows

use crate::collaborators::{ExecutableGraph, ExecutableStep, WorkflowCompiler};
use crate::errors::CompileError;
use run_types::{PortRef, Profile, Workflow, WorkflowBundle};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Orders processors so that every processor runs after the processors
/// feeding it. Ties keep declaration order.
#[derive(Debug, Default, Clone)]
pub struct SequentialCompiler;

impl SequentialCompiler {
    pub fn new() -> Self {
        Self
    }

    fn compile_workflow(
        &self,
        bundle: &WorkflowBundle,
        workflow: &Workflow,
        profile: &Profile,
        stack: &mut Vec<String>,
    ) -> Result<ExecutableGraph, CompileError> {
        if stack.iter().any(|name| name == &workflow.name) {
            return Err(CompileError::RecursiveWorkflow(workflow.name.clone()));
        }
        stack.push(workflow.name.clone());

        check_links(workflow)?;
        let order = topological_order(workflow)?;

        let mut steps = Vec::with_capacity(order.len());
        let mut nested = BTreeMap::new();
        for processor in order {
            let activities: Vec<_> = profile.activities_for(&workflow.name, processor).collect();
            if activities.is_empty() {
                return Err(CompileError::UnboundProcessor {
                    workflow: workflow.name.clone(),
                    processor: processor.to_string(),
                });
            }
            for activity in &activities {
                if !activity.is_nested_workflow() {
                    continue;
                }
                if let Some(name) = activity.nested_workflow.as_deref() {
                    if nested.contains_key(name) {
                        continue;
                    }
                    let inner = bundle
                        .workflow(name)
                        .ok_or_else(|| CompileError::UnknownNestedWorkflow(name.to_string()))?;
                    let graph = self.compile_workflow(bundle, inner, profile, stack)?;
                    nested.insert(name.to_string(), graph);
                }
            }
            steps.push(ExecutableStep {
                processor: processor.to_string(),
                activities: activities.iter().map(|a| a.name.clone()).collect(),
            });
        }

        stack.pop();
        Ok(ExecutableGraph {
            workflow: workflow.name.clone(),
            profile: profile.name.clone(),
            steps,
            nested,
        })
    }
}

impl WorkflowCompiler for SequentialCompiler {
    fn compile(
        &self,
        bundle: &WorkflowBundle,
        workflow: &Workflow,
        profile: &Profile,
    ) -> Result<ExecutableGraph, CompileError> {
        let graph = self.compile_workflow(bundle, workflow, profile, &mut Vec::new())?;
        tracing::debug!(
            workflow = %workflow.name,
            steps = graph.steps.len(),
            "Compiled workflow"
        );
        Ok(graph)
    }

    fn name(&self) -> &str {
        "sequential"
    }
}

/// Every link must join declared ports: sources are workflow inputs or
/// processor outputs, sinks are processor inputs or workflow outputs.
fn check_links(workflow: &Workflow) -> Result<(), CompileError> {
    for link in &workflow.data_links {
        let source_ok = match &link.source {
            PortRef::Workflow { port } => workflow.input_ports.iter().any(|p| &p.name == port),
            PortRef::Processor { processor, port } => workflow
                .processor(processor)
                .and_then(|p| p.output_port(port))
                .is_some(),
        };
        let sink_ok = match &link.sink {
            PortRef::Workflow { port } => workflow.output_ports.iter().any(|p| &p.name == port),
            PortRef::Processor { processor, port } => workflow
                .processor(processor)
                .and_then(|p| p.input_port(port))
                .is_some(),
        };
        if !source_ok || !sink_ok {
            return Err(CompileError::DanglingLink {
                workflow: workflow.name.clone(),
                link: format!("{} -> {}", link.source, link.sink),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm over processor-to-processor links
fn topological_order(workflow: &Workflow) -> Result<Vec<&str>, CompileError> {
    let names: Vec<&str> = workflow.processors.iter().map(|p| p.name.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (*n, 0)).collect();
    let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();

    for link in &workflow.data_links {
        if let (
            PortRef::Processor { processor: from, .. },
            PortRef::Processor { processor: to, .. },
        ) = (&link.source, &link.sink)
        {
            downstream.entry(from.as_str()).or_default().push(to.as_str());
            if let Some(degree) = in_degree.get_mut(to.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut ready: VecDeque<&str> = names
        .iter()
        .copied()
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(names.len());
    while let Some(name) = ready.pop_front() {
        order.push(name);
        for next in downstream.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(*next);
                }
            }
        }
    }

    if order.len() < names.len() {
        let stuck = names
            .iter()
            .find(|n| !order.contains(n))
            .copied()
            .unwrap_or_default();
        return Err(CompileError::Cycle {
            workflow: workflow.name.clone(),
            processor: stuck.to_string(),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use run_types::{Activity, Processor, ProcessorBinding};

    fn chain_bundle(links: &[(&str, &str)]) -> WorkflowBundle {
        let mut bundle = WorkflowBundle::with_uri("chain", "http://example.com/chain/");
        let mut wf = Workflow::new("Chain");
        let mut profile = Profile::new("local");
        for name in ["c", "a", "b"] {
            wf.add_processor(Processor::new(name).with_input("in").with_output("out"))
                .unwrap();
            profile
                .add_activity(Activity::new(name, "urn:x").with_input("in").with_output("out"))
                .unwrap();
            profile.bind(ProcessorBinding::new("Chain", name, name));
        }
        for (from, to) in links {
            wf.add_link(PortRef::processor(*from, "out"), PortRef::processor(*to, "in"));
        }
        bundle.add_workflow(wf).unwrap();
        bundle.add_profile(profile).unwrap();
        bundle
    }

    fn compile(bundle: &WorkflowBundle) -> Result<ExecutableGraph, CompileError> {
        SequentialCompiler::new().compile(
            bundle,
            bundle.main_workflow().unwrap(),
            bundle.main_profile().unwrap(),
        )
    }

    #[test]
    fn test_dependency_order() {
        let bundle = chain_bundle(&[("a", "b"), ("b", "c")]);
        let graph = compile(&bundle).unwrap();
        let order: Vec<&str> = graph.steps.iter().map(|s| s.processor.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(graph.step("a").unwrap().activities, vec!["a"]);
    }

    #[test]
    fn test_independent_processors_keep_declaration_order() {
        let bundle = chain_bundle(&[]);
        let graph = compile(&bundle).unwrap();
        let order: Vec<&str> = graph.steps.iter().map(|s| s.processor.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let bundle = chain_bundle(&[("a", "b"), ("b", "a")]);
        assert!(matches!(compile(&bundle), Err(CompileError::Cycle { .. })));
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut bundle = chain_bundle(&[]);
        bundle
            .workflows
            .get_mut("Chain")
            .unwrap()
            .add_link(PortRef::processor("a", "missing"), PortRef::processor("b", "in"));
        assert!(matches!(compile(&bundle), Err(CompileError::DanglingLink { .. })));
    }

    #[test]
    fn test_unbound_processor_rejected() {
        let mut bundle = chain_bundle(&[]);
        bundle.profiles.get_mut("local").unwrap().processor_bindings.clear();
        assert!(matches!(
            compile(&bundle),
            Err(CompileError::UnboundProcessor { .. })
        ));
    }

    #[test]
    fn test_nested_workflow_compiled() {
        let mut bundle = WorkflowBundle::with_uri("nested", "http://example.com/nested/");
        let mut outer = Workflow::new("Outer");
        outer.add_processor(Processor::new("wrap")).unwrap();
        bundle.add_workflow(outer).unwrap();
        let mut inner = Workflow::new("Inner");
        inner.add_processor(Processor::new("leaf")).unwrap();
        bundle.add_workflow(inner).unwrap();
        let mut profile = Profile::new("local");
        profile.add_activity(Activity::nested("wrap", "Inner")).unwrap();
        profile.add_activity(Activity::new("leaf", "urn:x")).unwrap();
        profile.bind(ProcessorBinding::new("Outer", "wrap", "wrap"));
        profile.bind(ProcessorBinding::new("Inner", "leaf", "leaf"));
        bundle.add_profile(profile).unwrap();

        let graph = compile(&bundle).unwrap();
        assert_eq!(graph.nested["Inner"].steps[0].processor, "leaf");
    }
}
