//! This module contains the abstract interpreter: a constant-propagation
//! analysis over EVM bytecode that replays a prefix of control-flow
//! decisions and then explores everything reachable beyond it.
//!
//! # How It Works
//!
//! Analysis proceeds in two phases. The precondition replay walks the
//! prefix one program counter at a time, carrying the abstract machine state
//! that concrete execution must have had at each point. The suffix fixpoint
//! then seeds a worklist with the states flowing out of the prefix's last
//! instruction and explores until no state changes, reporting the first way
//! any reachable path may fail.
//!
//! # Partitioning
//!
//! States flowing into the same program counter with different concrete
//! stack depths are tracked as separate partitions, up to
//! [`Config::max_disjuncts`] per program counter. Beyond the bound, further
//! states collapse into a single shared partition per program counter. This
//! keeps join precision at merge points without letting the state table grow
//! without bound.

pub mod prev_pc;
pub mod targets;
mod transfer;
pub mod verdict;

use std::{
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use ethnum::U256;
use itertools::Itertools;

use crate::{
    constant::{
        ASSERTION_FAILED_TOPIC,
        DEFAULT_FAIL_ON_TOP_MEMORY_RESIZE,
        DEFAULT_MAX_DISJUNCTS,
        DEFAULT_USE_BOUNDED_JOINS,
        DEFAULT_VERBOSE,
    },
    contract::Contract,
    domain::{
        memory::AbsMemory,
        state::{AbsState, MachineState},
        value::AbsValue,
    },
    error::analysis,
    interpreter::{
        prev_pc::PrevPcMap,
        targets::TargetRegistry,
        verdict::{FailureCause, StepResult, Successor, Verdict},
    },
    opcode,
    opcode::{
        table::{InstructionTable, RequiredMemory},
        version::EthereumVersion,
    },
};

/// The configuration for the abstract interpreter.
///
/// The configuration is fixed when the interpreter is constructed and cannot
/// change for the lifetime of an analysis session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The hardfork whose instruction set the bytecode is analyzed against.
    ///
    /// Defaults to [`EthereumVersion::Byzantium`].
    pub version: EthereumVersion,

    /// Whether a memory expansion of unknown size fails the analysis instead
    /// of widening the abstract memory to an unknown state.
    ///
    /// Defaults to [`crate::constant::DEFAULT_FAIL_ON_TOP_MEMORY_RESIZE`].
    pub fail_on_top_mem_resize: bool,

    /// The number of concrete stack-depth partitions tracked per program
    /// counter before further states collapse into the shared partition.
    ///
    /// Defaults to [`crate::constant::DEFAULT_MAX_DISJUNCTS`].
    pub max_disjuncts: usize,

    /// Whether each partition is processed at most once, trading precision
    /// for a hard bound on worklist length even on pathological bytecode.
    ///
    /// Defaults to [`crate::constant::DEFAULT_USE_BOUNDED_JOINS`].
    pub use_bounded_joins: bool,

    /// Whether the analysis dumps the prefix and bytecode on entry.
    ///
    /// Defaults to [`crate::constant::DEFAULT_VERBOSE`].
    pub verbose: bool,
}

impl Config {
    /// Sets the `version` config parameter to `value`.
    #[must_use]
    pub fn with_version(mut self, value: EthereumVersion) -> Self {
        self.version = value;
        self
    }

    /// Sets the `fail_on_top_mem_resize` config parameter to `value`.
    #[must_use]
    pub fn with_fail_on_top_mem_resize(mut self, value: bool) -> Self {
        self.fail_on_top_mem_resize = value;
        self
    }

    /// Sets the `max_disjuncts` config parameter to `value`.
    #[must_use]
    pub fn with_max_disjuncts(mut self, value: usize) -> Self {
        self.max_disjuncts = value;
        self
    }

    /// Sets the `use_bounded_joins` config parameter to `value`.
    #[must_use]
    pub fn with_use_bounded_joins(mut self, value: bool) -> Self {
        self.use_bounded_joins = value;
        self
    }

    /// Sets the `verbose` config parameter to `value`.
    #[must_use]
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: EthereumVersion::default(),
            fail_on_top_mem_resize: DEFAULT_FAIL_ON_TOP_MEMORY_RESIZE,
            max_disjuncts: DEFAULT_MAX_DISJUNCTS,
            use_bounded_joins: DEFAULT_USE_BOUNDED_JOINS,
            verbose: DEFAULT_VERBOSE,
        }
    }
}

/// The key under which a state flowing into a program counter is tracked.
///
/// States with a concrete stack depth are tracked per depth; states with an
/// unknown depth, or ones collapsed by the partition bound, share the
/// depth-less key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct PartitionKey {
    pc: u64,
    stack_len: Option<usize>,
}

impl PartitionKey {
    /// Builds the natural key for `state` at `pc`.
    fn for_state(pc: u64, state: &MachineState) -> Self {
        Self {
            pc,
            stack_len: state.stack.len(),
        }
    }

    /// Builds the shared, depth-less key for `pc`.
    fn collapsed(pc: u64) -> Self {
        Self {
            pc,
            stack_len: None,
        }
    }
}

/// The abstract interpreter over one contract's bytecode.
#[derive(Clone, Debug)]
pub struct Interpreter {
    contract: Rc<Contract>,
    config: Config,
    table: InstructionTable,
}

impl Interpreter {
    /// Constructs a new interpreter over the provided `contract`.
    #[must_use]
    pub fn new(contract: Rc<Contract>, config: Config) -> Self {
        let table = InstructionTable::new(config.version);
        Self {
            contract,
            config,
            table,
        }
    }

    /// Analyzes everything reachable beyond the provided `prefix` of
    /// program-counter decisions, consulting `targets` for the instructions
    /// the host treats specially.
    ///
    /// The returned verdict states whether some reachable path may fail, and
    /// with which cause. An empty prefix analyzes the contract from its
    /// entry point.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the prefix cannot be replayed at all, which means
    /// the host and the analysis disagree about the bytecode. A prefix whose
    /// replay *may fail* is reported as a verdict, not an error.
    pub fn analyze(
        &self,
        prefix: &[u64],
        targets: &TargetRegistry,
    ) -> analysis::Result<Verdict> {
        if self.config.verbose {
            tracing::debug!(
                prefix = %prefix.iter().map(ToString::to_string).join(", "),
                code = %hex::encode(self.contract.bytecode()),
                "analyzing execution suffix"
            );
        }

        let precondition = self.calculate_precondition(prefix, targets)?;
        let seed = match precondition {
            StepResult::MayFail(cause) => return Ok(Verdict::prefix_may_fail(cause)),
            StepResult::Successors(successors) => successors,
        };

        let mut fixpoint = Fixpoint::new(self.config.max_disjuncts, self.config.use_bounded_joins);
        fixpoint.add_states(prefix.last().copied(), seed);

        while let Some(key) = fixpoint.next_key() {
            let Some(machine) = fixpoint.reached_state(key) else {
                continue;
            };
            let result = self.step(key.pc, fixpoint.prev_pcs(), &machine, targets, false);
            match result {
                StepResult::MayFail(cause) => return Ok(Verdict::may_fail(cause)),
                StepResult::Successors(successors) => {
                    fixpoint.add_states(Some(key.pc), successors);
                }
            }
        }

        Ok(Verdict::ok())
    }

    /// Reconstructs the abstract machine state at the end of the prefix by
    /// replaying its decisions from the initial state.
    ///
    /// At each index the post-states of the previous step are filtered to
    /// the ones matching the next decision and joined. The prefix was
    /// executed concretely by the host, so failures that concrete execution
    /// evidently got past (targets, invalid opcodes, bad jump targets) are
    /// suppressed rather than reported.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the joined state at some index is unreachable,
    /// which a genuinely executed prefix can never produce.
    fn calculate_precondition(
        &self,
        prefix: &[u64],
        targets: &TargetRegistry,
    ) -> analysis::Result<StepResult> {
        let mut prev_pcs = PrevPcMap::new();
        let mut current = StepResult::Successors(vec![Successor {
            pc: 0,
            state: MachineState::initial(),
        }]);

        for (index, &pc) in prefix.iter().enumerate() {
            let StepResult::Successors(successors) = &current else {
                return Ok(current);
            };

            let mut state = AbsState::bot();
            for successor in successors.iter().filter(|successor| successor.pc == pc) {
                if index > 0 {
                    prev_pcs.record(pc, prefix[index - 1]);
                }
                state = state.join(&AbsState::Reached(successor.state.clone())).0;
            }
            let AbsState::Reached(machine) = state else {
                return Err(analysis::Error::InfeasiblePrefix { index, pc });
            };

            let result = self.step(pc, &prev_pcs, &machine, targets, true);
            if matches!(result, StepResult::MayFail(_)) {
                return Ok(result);
            }
            current = result;
        }

        Ok(current)
    }

    /// Abstractly executes the single instruction at `pc` over `machine`.
    ///
    /// With `ignore_targets` set (during prefix replay), target-gating and
    /// invalid-opcode failures become empty successor sets: the prefix is
    /// already known to be feasible concretely, so replay must not fail
    /// where concrete execution did not.
    fn step(
        &self,
        pc: u64,
        prev_pcs: &PrevPcMap,
        machine: &MachineState,
        targets: &TargetRegistry,
        ignore_targets: bool,
    ) -> StepResult {
        let op = self.contract.op_at(pc);
        let operation = self.table.op(op);

        // The table must agree with itself about which opcodes the analysis
        // models.
        match (operation.valid, operation.transfer) {
            (true, None) => return StepResult::MayFail(FailureCause::UnsupportedOpcode),
            (false, Some(_)) => return StepResult::MayFail(FailureCause::Internal),
            _ => {}
        }

        if !ignore_targets {
            if targets.targets_assertion_failed_events() && op == opcode::LOG1 {
                // The first topic of LOG1 sits below the offset and size
                // operands.
                if let Some(AbsValue::Known(topic)) = machine.stack.peek(2) {
                    if topic == U256::from_be_bytes(ASSERTION_FAILED_TOPIC) {
                        return StepResult::MayFail(FailureCause::ReachedAssertionFailed);
                    }
                }
            }
            if targets.is_target_instruction(self.contract.code_hash(), pc) {
                return StepResult::MayFail(FailureCause::ReachedTargetInstruction);
            }
        }

        let Some(transfer) = operation.transfer else {
            if op == opcode::INVALID
                && targets.is_covered_assertion(self.contract.code_hash(), pc)
            {
                // The assertion has already been covered, so there is no
                // need to report it again; the path just ends here.
                return StepResult::empty();
            }
            if ignore_targets {
                tracing::warn!(pc, opcode = op, "suppressing invalid opcode during prefix replay");
                return StepResult::empty();
            }
            return StepResult::MayFail(FailureCause::InvalidOpcode);
        };

        let Some(depth) = machine.stack.len() else {
            return StepResult::MayFail(FailureCause::TopStack);
        };
        if depth < operation.min_stack || depth > operation.max_stack {
            return StepResult::MayFail(FailureCause::InvalidStack);
        }

        // States may be referenced from multiple partitions, so all mutation
        // happens on a clone.
        let mut machine = machine.clone();
        match operation.memory.required_bytes(&machine.stack) {
            RequiredMemory::Top => {
                if self.config.fail_on_top_mem_resize {
                    return StepResult::MayFail(FailureCause::TopMemoryResize);
                }
                machine.memory = AbsMemory::top();
            }
            RequiredMemory::Overflow => {
                return StepResult::MayFail(FailureCause::MemoryOverflow);
            }
            RequiredMemory::Known(bytes) => {
                if bytes > 0 {
                    machine.memory.resize(bytes);
                }
            }
        }

        let result = transfer::execute(transfer, pc, &self.contract, machine, prev_pcs);
        if ignore_targets {
            if let StepResult::MayFail(FailureCause::InvalidOpcode) = &result {
                tracing::warn!(pc, "suppressing invalid jump target during prefix replay");
                return StepResult::empty();
            }
        }
        result
    }
}

/// The working state of the suffix fixpoint: the partitioned state table,
/// the FIFO worklist over partition keys, and the predecessor map built from
/// propagated edges.
#[derive(Clone, Debug)]
struct Fixpoint {
    max_disjuncts: usize,
    use_bounded_joins: bool,
    states: HashMap<PartitionKey, AbsState>,
    worklist: VecDeque<PartitionKey>,
    workset: HashSet<PartitionKey>,
    touched: HashSet<PartitionKey>,
    concrete_partitions: HashMap<u64, usize>,
    prev_pcs: PrevPcMap,
}

impl Fixpoint {
    fn new(max_disjuncts: usize, use_bounded_joins: bool) -> Self {
        Self {
            max_disjuncts,
            use_bounded_joins,
            states: HashMap::new(),
            worklist: VecDeque::new(),
            workset: HashSet::new(),
            touched: HashSet::new(),
            concrete_partitions: HashMap::new(),
            prev_pcs: PrevPcMap::new(),
        }
    }

    /// Dequeues the next partition key to process, preserving FIFO order.
    fn next_key(&mut self) -> Option<PartitionKey> {
        let key = self.worklist.pop_front()?;
        self.workset.remove(&key);
        Some(key)
    }

    /// Gets the reachable machine state stored under `key`, if any.
    fn reached_state(&self, key: PartitionKey) -> Option<MachineState> {
        match self.states.get(&key) {
            Some(AbsState::Reached(machine)) => Some(machine.clone()),
            _ => None,
        }
    }

    fn prev_pcs(&self) -> &PrevPcMap {
        &self.prev_pcs
    }

    /// Joins the provided `successors` into the state table, recording
    /// predecessor edges from `from` and enqueueing every partition whose
    /// state changed.
    fn add_states(&mut self, from: Option<u64>, successors: Vec<Successor>) {
        for successor in successors {
            if let Some(from) = from {
                self.prev_pcs.record(successor.pc, from);
            }

            let key = self.partition_key(successor.pc, &successor.state);
            let current = self.states.get(&key).cloned().unwrap_or(AbsState::Bot);
            let (joined, changed) = current.join(&AbsState::Reached(successor.state));
            if !changed {
                continue;
            }

            let is_new = self.states.insert(key, joined).is_none();
            if is_new && key.stack_len.is_some() {
                *self.concrete_partitions.entry(key.pc).or_insert(0) += 1;
            }
            self.enqueue(key);
        }
    }

    /// Selects the partition under which a state at `pc` is tracked,
    /// collapsing to the shared partition once the per-counter bound is
    /// reached.
    fn partition_key(&self, pc: u64, state: &MachineState) -> PartitionKey {
        let key = PartitionKey::for_state(pc, state);
        if key.stack_len.is_none() || self.states.contains_key(&key) {
            return key;
        }
        let existing = self.concrete_partitions.get(&pc).copied().unwrap_or(0);
        if existing < self.max_disjuncts {
            key
        } else {
            PartitionKey::collapsed(pc)
        }
    }

    fn enqueue(&mut self, key: PartitionKey) {
        if self.use_bounded_joins && self.touched.contains(&key) {
            return;
        }
        self.touched.insert(key);
        if self.workset.insert(key) {
            self.worklist.push_back(key);
        }
    }
}
