//! This module contains the abstract machine state tracked per program
//! counter, and the join that combines states flowing into the same point.

use crate::domain::{memory::AbsMemory, stack::AbsStack};

/// The stack and memory of an abstractly interpreted machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineState {
    /// The abstract stack.
    pub stack: AbsStack,

    /// The abstract memory.
    pub memory: AbsMemory,
}

impl MachineState {
    /// Creates the machine state at the entry of a call frame: an empty stack
    /// and an empty memory.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            stack: AbsStack::new(),
            memory: AbsMemory::new(),
        }
    }
}

/// The abstract state associated with a program counter.
///
/// [`Self::Bot`] describes a point that no execution has been observed to
/// reach. It is the identity of [`Self::join`], so states can be accumulated
/// into a table that defaults to `Bot` everywhere.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AbsState {
    /// No execution reaches this point.
    Bot,

    /// The point is reachable with the contained machine state.
    Reached(MachineState),
}

impl AbsState {
    /// Creates the unreachable state.
    #[must_use]
    pub fn bot() -> Self {
        Self::Bot
    }

    /// Checks whether this state is unreachable.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot)
    }

    /// Combines this state with `other`, reporting whether the result differs
    /// from `self`.
    ///
    /// The operation is commutative, associative and idempotent, with
    /// [`Self::Bot`] as its identity.
    #[must_use]
    pub fn join(&self, other: &Self) -> (Self, bool) {
        let joined = match (self, other) {
            (Self::Bot, _) => other.clone(),
            (_, Self::Bot) => self.clone(),
            (Self::Reached(left), Self::Reached(right)) => {
                let (stack, _) = left.stack.join(&right.stack);
                let (memory, _) = left.memory.join(&right.memory);
                Self::Reached(MachineState { stack, memory })
            }
        };
        let changed = &joined != self;
        (joined, changed)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use crate::domain::{
        memory::AbsMemory,
        stack::AbsStack,
        state::{AbsState, MachineState},
        value::AbsValue,
    };

    /// Builds a reachable state with the provided stack values and memory
    /// words.
    fn reached(stack_values: &[AbsValue], memory_words: &[(u64, AbsValue)]) -> AbsState {
        let mut stack = AbsStack::new();
        for value in stack_values {
            stack.push(*value);
        }
        let mut memory = AbsMemory::new();
        for (offset, value) in memory_words {
            memory.write_word(*offset, *value);
            memory.resize(offset + 32);
        }
        AbsState::Reached(MachineState { stack, memory })
    }

    #[test]
    fn bot_is_the_join_identity() {
        let state = reached(&[AbsValue::known(1u64)], &[(0, AbsValue::known(2u64))]);

        let (joined, changed) = AbsState::bot().join(&state);
        assert!(changed);
        assert_eq!(joined, state);

        let (joined, changed) = state.join(&AbsState::bot());
        assert!(!changed);
        assert_eq!(joined, state);
    }

    #[test]
    fn join_is_idempotent() {
        let state = reached(&[AbsValue::Top], &[(32, AbsValue::known(7u64))]);
        let (joined, changed) = state.join(&state.clone());
        assert!(!changed);
        assert_eq!(joined, state);
    }

    /// A strategy producing arbitrary abstract values.
    fn abs_value() -> impl Strategy<Value = AbsValue> {
        prop_oneof![
            Just(AbsValue::Top),
            any::<u64>().prop_map(AbsValue::known),
            (0u64..4).prop_map(AbsValue::known),
        ]
    }

    /// A strategy producing arbitrary abstract states, biased towards small
    /// stacks and memories so that shape collisions actually occur.
    fn abs_state() -> impl Strategy<Value = AbsState> {
        let machine = (
            prop::collection::vec(abs_value(), 0..4),
            prop::collection::vec(((0u64..4).prop_map(|w| w * 32), abs_value()), 0..3),
        )
            .prop_map(|(stack_values, memory_words)| reached(&stack_values, &memory_words));
        prop_oneof![
            Just(AbsState::Bot),
            Just(AbsState::Reached(MachineState {
                stack: AbsStack::top(),
                memory: AbsMemory::top(),
            })),
            machine,
        ]
    }

    proptest! {
        #[test]
        fn join_is_commutative(a in abs_state(), b in abs_state()) {
            prop_assert_eq!(a.join(&b).0, b.join(&a).0);
        }

        #[test]
        fn join_is_associative(a in abs_state(), b in abs_state(), c in abs_state()) {
            let left = a.join(&b).0.join(&c).0;
            let right = a.join(&b.join(&c).0).0;
            prop_assert_eq!(left, right);
        }

        #[test]
        fn join_with_self_never_changes(a in abs_state()) {
            let (joined, changed) = a.join(&a);
            prop_assert!(!changed);
            prop_assert_eq!(joined, a);
        }

        #[test]
        fn top_stack_absorbs(a in abs_state()) {
            let top = AbsState::Reached(MachineState {
                stack: AbsStack::top(),
                memory: AbsMemory::top(),
            });
            if !a.is_bot() {
                prop_assert_eq!(top.join(&a).0, top);
            }
        }
    }
}
