// schedule.rs — Sequential schedule for a synchronous process network
//
// Produces a total process order such that running the processes one after
// another in that order reproduces zero-time synchronous execution. Starting
// points are taken from a FIFO queue seeded with the owners of the graph
// outputs. Each starting point is expanded depth-first over its in-ports
// (left to right) into a partial schedule, which is then spliced into the
// master schedule. A Delay is never expanded through: its feeder becomes a
// new starting point, which is what breaks feedback cycles.
//
// Preconditions: flat network.
// Postconditions: every process reachable backward from an output appears
//                 exactly once; every non-Delay consumer appears after its
//                 producers (see `verify_schedule`).
// Failure modes: missing references → `NetworkError`. Cycles without a
//                Delay → `E0400` diagnostic; unreachable processes → `W0401`.
// Side effects: none.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::debug;

use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::error::Result;
use crate::id::Id;
use crate::network::ProcessNetwork;

// ── Public types ────────────────────────────────────────────────────────────

/// Total execution order of one network tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub order: Vec<Id>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position(&self, id: &Id) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }
}

/// Result of schedule generation.
#[derive(Debug)]
pub struct ScheduleResult {
    pub schedule: Schedule,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for schedule postconditions (S1-S2).
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// S1: Every scheduled Id names a live process and appears once.
    pub s1_unique_existing: bool,
    /// S2: Every non-Delay consumer is scheduled after all its producers.
    pub s2_dependencies_ordered: bool,
}

impl crate::pass::StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.s1_unique_existing && self.s2_dependencies_ordered
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("S1_unique_existing", self.s1_unique_existing),
            ("S2_dependencies_ordered", self.s2_dependencies_ordered),
        ]
    }
}

/// Verify schedule postconditions against the network it was computed for.
pub fn verify_schedule(net: &ProcessNetwork, schedule: &Schedule) -> ScheduleCert {
    ScheduleCert {
        s1_unique_existing: verify_s1_unique_existing(net, schedule),
        s2_dependencies_ordered: verify_s2_dependencies_ordered(net, schedule),
    }
}

fn verify_s1_unique_existing(net: &ProcessNetwork, schedule: &Schedule) -> bool {
    let mut seen = HashSet::with_capacity(schedule.len());
    schedule
        .order
        .iter()
        .all(|id| net.contains(id) && seen.insert(id))
}

/// Edges leaving a Delay carry last tick's value and impose no order.
fn verify_s2_dependencies_ordered(net: &ProcessNetwork, schedule: &Schedule) -> bool {
    let pos: HashMap<&Id, usize> = schedule
        .order
        .iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();
    for (i, id) in schedule.order.iter().enumerate() {
        let Some(process) = net.get(id) else {
            return false;
        };
        if process.is_delay() {
            continue;
        }
        let Ok(preds) = net.predecessors(id) else {
            return false;
        };
        for pred in preds {
            match pos.get(&pred) {
                Some(&p) if p < i => {}
                _ => return false,
            }
        }
    }
    true
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Compute the sequential schedule of `net`.
pub fn find_schedule(net: &ProcessNetwork) -> Result<ScheduleResult> {
    let mut ctx = ScheduleCtx::new(net);
    ctx.run()?;
    Ok(ctx.build_result())
}

// ── Internal context ────────────────────────────────────────────────────────

/// A partial schedule and where it goes in the master schedule.
/// `anchor == None` means prepend.
struct Partial {
    order: Vec<Id>,
    anchor: Option<Id>,
}

struct ScheduleCtx<'a> {
    net: &'a ProcessNetwork,
    queue: VecDeque<Id>,
    visited: HashSet<Id>,
    master: Vec<Id>,
    diagnostics: Vec<Diagnostic>,
    reported_cycles: HashSet<Id>,
}

impl<'a> ScheduleCtx<'a> {
    fn new(net: &'a ProcessNetwork) -> Self {
        ScheduleCtx {
            net,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            master: Vec::new(),
            diagnostics: Vec::new(),
            reported_cycles: HashSet::new(),
        }
    }

    fn diag(&mut self, level: DiagLevel, code: DiagCode, subject: &Id, message: String) {
        self.diagnostics
            .push(Diagnostic::new(level, Some(subject.clone()), message).with_code(code));
    }

    fn build_result(self) -> ScheduleResult {
        ScheduleResult {
            schedule: Schedule { order: self.master },
            diagnostics: self.diagnostics,
        }
    }

    fn run(&mut self) -> Result<()> {
        self.queue.extend(self.net.output_processes()?);

        while let Some(start) = self.queue.pop_front() {
            let mut local = HashSet::new();
            let mut on_stack = Vec::new();
            let partial = self.find_partial_schedule(&start, &mut local, &mut on_stack)?;
            self.visited.extend(local);
            self.insert(partial);
        }

        let unscheduled: Vec<Id> = self
            .net
            .ids()
            .into_iter()
            .filter(|id| !self.visited.contains(id))
            .collect();
        for id in unscheduled {
            self.diag(
                DiagLevel::Warning,
                codes::W0401,
                &id,
                format!("process '{}' does not reach any graph output and was not scheduled", id),
            );
        }
        Ok(())
    }

    fn insert(&mut self, partial: Partial) {
        if partial.order.is_empty() {
            return;
        }
        let at = match &partial.anchor {
            Some(anchor) => match self.master.iter().position(|x| x == anchor) {
                Some(pos) => pos + 1,
                None => 0,
            },
            None => 0,
        };
        debug!(
            count = partial.order.len(),
            at,
            anchor = ?partial.anchor.as_ref().map(Id::as_str),
            "inserting partial schedule"
        );
        self.master.splice(at..at, partial.order);
    }

    /// Of two anchors, the one placed later in the master schedule.
    fn later_anchor(&self, a: Option<Id>, b: Option<Id>) -> Option<Id> {
        match (a, b) {
            (None, x) | (x, None) => x,
            (Some(a), Some(b)) => {
                let pa = self.master.iter().position(|x| *x == a);
                let pb = self.master.iter().position(|x| *x == b);
                if pb > pa {
                    Some(b)
                } else {
                    Some(a)
                }
            }
        }
    }

    // ── Depth-first expansion ───────────────────────────────────────────

    fn find_partial_schedule(
        &mut self,
        start: &Id,
        local: &mut HashSet<Id>,
        on_stack: &mut Vec<Id>,
    ) -> Result<Partial> {
        if self.visited.contains(start) {
            return Ok(Partial {
                order: Vec::new(),
                anchor: Some(start.clone()),
            });
        }
        if on_stack.contains(start) {
            self.report_cycle(start, on_stack);
            return Ok(Partial {
                order: Vec::new(),
                anchor: None,
            });
        }

        let net = self.net;
        let process = net.process(start)?;
        let mut partial = Partial {
            order: Vec::new(),
            anchor: None,
        };

        if process.is_delay() {
            for pred in net.predecessors(start)? {
                debug!(delay = %start, feeder = %pred, "enqueue delay feeder");
                self.queue.push_back(pred);
            }
        } else {
            on_stack.push(start.clone());
            for &key in &process.in_ports {
                let Some(peer) = net.connected(key)? else {
                    // Graph input: contributes nothing, prepend.
                    continue;
                };
                let pred = net.owner(peer)?.clone();
                if local.contains(&pred) {
                    continue;
                }
                let sub = self.find_partial_schedule(&pred, local, on_stack)?;
                partial.order.extend(sub.order);
                partial.anchor = self.later_anchor(partial.anchor.take(), sub.anchor);
            }
            on_stack.pop();
        }

        partial.order.push(start.clone());
        local.insert(start.clone());
        Ok(partial)
    }

    fn report_cycle(&mut self, start: &Id, on_stack: &[Id]) {
        if !self.reported_cycles.insert(start.clone()) {
            return;
        }
        let from = on_stack.iter().position(|x| x == start).unwrap_or(0);
        let path: Vec<&str> = on_stack[from..].iter().map(Id::as_str).collect();
        self.diag(
            DiagLevel::Error,
            codes::E0400,
            start,
            format!(
                "cannot schedule feedback cycle without a delay: {} -> {}",
                path.join(" -> "),
                start
            ),
        );
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schedule ({} processes)", self.order.len())?;
        for (i, id) in self.order.iter().enumerate() {
            writeln!(f, "  {i}: {id}")?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::StageCert;
    use crate::process::{Direction, ProcessKind};
    use crate::section::tests::{add_map, link};

    fn ids(xs: &[&str]) -> Vec<Id> {
        xs.iter().map(|s| Id::new(*s)).collect()
    }

    fn add_delay(net: &mut ProcessNetwork, id: &str) -> Id {
        let id = net
            .add_process(
                id,
                ProcessKind::Delay {
                    initial: "0".to_string(),
                },
            )
            .unwrap();
        net.add_port(&id, "in", Direction::In, None).unwrap();
        net.add_port(&id, "out", Direction::Out, None).unwrap();
        id
    }

    fn mark_input(net: &mut ProcessNetwork, id: &Id) {
        let key = net.port_at(id, Direction::In, 0).unwrap();
        net.add_input(key).unwrap();
    }

    fn mark_output(net: &mut ProcessNetwork, id: &Id, index: usize) {
        let key = net.port_at(id, Direction::Out, index).unwrap();
        net.add_output(key).unwrap();
    }

    /// A -> B -> C, input at A, output at C.
    fn chain() -> ProcessNetwork {
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "A", "x");
        let b = add_map(&mut net, "B", "x");
        let c = add_map(&mut net, "C", "x");
        link(&mut net, &a, 0, &b, 0);
        link(&mut net, &b, 0, &c, 0);
        mark_input(&mut net, &a);
        mark_output(&mut net, &c, 0);
        net
    }

    fn add_fanout(net: &mut ProcessNetwork, id: &str, outs: usize) -> Id {
        let id = net.add_process(id, ProcessKind::FanOut).unwrap();
        net.add_port(&id, "in", Direction::In, None).unwrap();
        for i in 0..outs {
            net.add_port(&id, format!("out{i}"), Direction::Out, None).unwrap();
        }
        id
    }

    fn count(schedule: &Schedule, id: &str) -> usize {
        schedule.order.iter().filter(|x| x.as_str() == id).count()
    }

    /// A -> B -> F, F.out0 is the graph output, F.out1 -> D -> A.
    fn feedback() -> ProcessNetwork {
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "A", "x");
        let b = add_map(&mut net, "B", "x");
        let f = add_fanout(&mut net, "F", 2);
        let d = add_delay(&mut net, "D");
        link(&mut net, &a, 0, &b, 0);
        link(&mut net, &b, 0, &f, 0);
        link(&mut net, &f, 1, &d, 0);
        link(&mut net, &d, 0, &a, 0);
        mark_output(&mut net, &f, 0);
        net
    }

    #[test]
    fn acyclic_chain_is_scheduled_in_order() {
        let net = chain();
        let result = find_schedule(&net).unwrap();
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.schedule.order, ids(&["A", "B", "C"]));
        assert!(verify_schedule(&net, &result.schedule).all_pass());
    }

    #[test]
    fn feedback_through_delay_schedules_each_once() {
        let net = feedback();
        assert!(net.validate().is_empty(), "{:?}", net.validate());
        let result = find_schedule(&net).unwrap();
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.schedule.order, ids(&["D", "A", "B", "F"]));
        assert_eq!(count(&result.schedule, "D"), 1);
        assert_eq!(count(&result.schedule, "A"), 1);
        assert!(verify_schedule(&net, &result.schedule).all_pass());
    }

    #[test]
    fn schedule_is_deterministic() {
        let net = feedback();
        let first = find_schedule(&net).unwrap().schedule;
        for _ in 0..5 {
            assert_eq!(find_schedule(&net).unwrap().schedule, first);
        }
    }

    #[test]
    fn delay_feeder_off_the_output_path_is_scheduled_after_anchor() {
        // D -> A -> F, F.out0 is the graph output, F.out1 -> B -> D (B only
        // feeds the delay).
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "A", "x");
        let b = add_map(&mut net, "B", "x");
        let f = add_fanout(&mut net, "F", 2);
        let d = add_delay(&mut net, "D");
        link(&mut net, &d, 0, &a, 0);
        link(&mut net, &a, 0, &f, 0);
        link(&mut net, &f, 1, &b, 0);
        link(&mut net, &b, 0, &d, 0);
        mark_output(&mut net, &f, 0);
        assert!(net.validate().is_empty(), "{:?}", net.validate());

        let result = find_schedule(&net).unwrap();
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.schedule.order, ids(&["D", "A", "F", "B"]));
        assert!(verify_schedule(&net, &result.schedule).all_pass());
    }

    #[test]
    fn shared_producer_appears_once() {
        // A feeds both B and C through a fanout; outputs at B and C.
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "A", "x");
        let b = add_map(&mut net, "B", "x");
        let c = add_map(&mut net, "C", "x");
        let fan = add_fanout(&mut net, "F", 2);
        link(&mut net, &a, 0, &fan, 0);
        link(&mut net, &fan, 0, &b, 0);
        link(&mut net, &fan, 1, &c, 0);
        mark_input(&mut net, &a);
        mark_output(&mut net, &b, 0);
        mark_output(&mut net, &c, 0);

        let result = find_schedule(&net).unwrap();
        // C is anchored right after its already scheduled producer F.
        assert_eq!(result.schedule.order, ids(&["A", "F", "C", "B"]));
        assert!(verify_schedule(&net, &result.schedule).all_pass());
    }

    #[test]
    fn unreachable_process_is_reported() {
        let mut net = chain();
        add_map(&mut net, "orphan", "x");
        let result = find_schedule(&net).unwrap();
        assert_eq!(result.schedule.len(), 3);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::W0401));
        assert_eq!(result.diagnostics[0].level, DiagLevel::Warning);
    }

    #[test]
    fn cycle_without_delay_is_an_error() {
        let mut net = feedback();
        // Replace the delay by a plain map.
        net.process_mut(&Id::new("D")).unwrap().kind = ProcessKind::Map {
            function: crate::function::Function::unary("f", crate::section::tests::int(), "x"),
        };
        assert!(net.validate().iter().any(|d| d.code == Some(codes::E0400)));
        let result = find_schedule(&net).unwrap();
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::E0400) && d.level == DiagLevel::Error));
    }

    #[test]
    fn verify_rejects_out_of_order_schedule() {
        let net = chain();
        let bad = Schedule {
            order: ids(&["B", "A", "C"]),
        };
        let cert = verify_schedule(&net, &bad);
        assert!(cert.s1_unique_existing);
        assert!(!cert.s2_dependencies_ordered);
        let dup = Schedule {
            order: ids(&["A", "A", "B", "C"]),
        };
        assert!(!verify_schedule(&net, &dup).s1_unique_existing);
    }

    #[test]
    fn display_lists_positions() {
        let result = find_schedule(&chain()).unwrap();
        let text = result.schedule.to_string();
        assert!(text.starts_with("Schedule (3 processes)"));
        assert!(text.contains("  2: C"));
    }
}
