//! Call Arena Manager
//!
//! Every parse call runs inside its own [`CallArena`], a bulk-freed memory
//! region backed by [`bumpalo::Bump`]. The arena is pushed as the thread's
//! current allocation context while the call runs and is popped and destroyed
//! on every exit path, unwinding included, by drop guards.
//!
//! Child arenas borrow their parent, so a descendant can never outlive the
//! call arena it was created from.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use bumpalo::Bump;
use tracing::trace;

use crate::errors::{QueryParserError, Result};
use crate::runtime::runtime;

/// Name reported by [`current_context`] when no arena is active.
pub const ROOT_CONTEXT: &str = "root";

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextFrame>> = const { RefCell::new(Vec::new()) };
    static LIVE_ARENAS: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone, Copy)]
struct ContextFrame {
    id: ArenaId,
    name: &'static str,
}

/// Process-unique arena identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(u64);

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena#{}", self.0)
    }
}

// ============================================================================
// CALL ARENA
// ============================================================================

/// An isolated memory region owned by exactly one call.
pub struct CallArena<'parent> {
    id: ArenaId,
    name: &'static str,
    parent: Option<ArenaId>,
    depth: usize,
    bump: Bump,
    _parent: PhantomData<&'parent ()>,
}

impl CallArena<'static> {
    /// Opens a top-level arena with `capacity` bytes reserved up front.
    pub fn open(name: &'static str, capacity: usize) -> Result<Self> {
        Self::create(name, capacity, None, 0)
    }
}

impl<'parent> CallArena<'parent> {
    fn create(
        name: &'static str,
        capacity: usize,
        parent: Option<ArenaId>,
        depth: usize,
    ) -> Result<Self> {
        let bump = Bump::try_with_capacity(capacity)
            .map_err(|_| QueryParserError::ArenaExhausted { capacity })?;
        let id = ArenaId(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed));
        LIVE_ARENAS.with(|live| live.set(live.get() + 1));
        trace!(arena = %id, name, ?parent, capacity, "arena created");
        Ok(Self {
            id,
            name,
            parent,
            depth,
            bump,
            _parent: PhantomData,
        })
    }

    /// Creates a descendant arena that is destroyed no later than `self`.
    pub fn child(&self, name: &'static str) -> Result<CallArena<'_>> {
        CallArena::create(name, 0, Some(self.id), self.depth + 1)
    }

    /// Makes this arena the thread's current allocation context until the
    /// returned guard is dropped.
    pub fn make_current(&self) -> ContextGuard<'_> {
        ContextGuard::enter(self)
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<ArenaId> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes currently held by this arena's chunks.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    pub(crate) fn bump(&self) -> &Bump {
        &self.bump
    }

    /// Copies `text` into the arena.
    pub fn alloc_str(&self, text: &str) -> &str {
        self.bump.alloc_str(text)
    }

    /// A byte sink whose storage lives in this arena.
    pub fn buffer(&self) -> ArenaBuffer<'_> {
        ArenaBuffer {
            bytes: bumpalo::collections::Vec::new_in(&self.bump),
        }
    }
}

impl Drop for CallArena<'_> {
    fn drop(&mut self) {
        let _ = LIVE_ARENAS.try_with(|live| live.set(live.get().saturating_sub(1)));
        trace!(
            arena = %self.id,
            name = self.name,
            bytes = self.bump.allocated_bytes(),
            "arena destroyed"
        );
    }
}

impl fmt::Debug for CallArena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallArena")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("depth", &self.depth)
            .field("allocated_bytes", &self.bump.allocated_bytes())
            .finish()
    }
}

// ============================================================================
// CONTEXT SWITCHING
// ============================================================================

/// Restores the previous allocation context when dropped.
#[must_use = "the context is restored as soon as the guard is dropped"]
pub struct ContextGuard<'arena> {
    restore_to: usize,
    _arena: PhantomData<&'arena ()>,
}

impl<'arena> ContextGuard<'arena> {
    fn enter(arena: &'arena CallArena<'_>) -> Self {
        let restore_to = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.len();
            stack.push(ContextFrame {
                id: arena.id,
                name: arena.name,
            });
            depth
        });
        Self {
            restore_to,
            _arena: PhantomData,
        }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let _ = CONTEXT_STACK.try_with(|stack| stack.borrow_mut().truncate(self.restore_to));
    }
}

/// Name of the thread's current allocation context.
pub fn current_context() -> &'static str {
    CONTEXT_STACK.with(|stack| stack.borrow().last().map_or(ROOT_CONTEXT, |frame| frame.name))
}

/// Number of arenas stacked as allocation contexts on this thread.
pub fn context_depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

/// Number of arenas alive on this thread.
pub fn live_arenas() -> usize {
    LIVE_ARENAS.with(Cell::get)
}

// ============================================================================
// SCOPED EXECUTION
// ============================================================================

/// Runs `body` inside a fresh call arena.
///
/// The arena is the current allocation context while `body` runs. Afterwards
/// the previous context is restored and the arena destroyed, whether `body`
/// returns or unwinds. Anything `body` wants to keep must be copied into
/// caller-owned memory before it returns.
pub fn with_scoped_arena<R>(
    name: &'static str,
    body: impl FnOnce(&CallArena<'static>) -> R,
) -> Result<R> {
    let runtime = runtime()?;
    let arena = CallArena::open(name, runtime.config().arena_capacity)?;
    let result = {
        let _current = arena.make_current();
        body(&arena)
    };
    drop(arena);
    Ok(result)
}

// ============================================================================
// ARENA BUFFER
// ============================================================================

/// An `io::Write` sink backed by arena memory.
pub struct ArenaBuffer<'arena> {
    bytes: bumpalo::collections::Vec<'arena, u8>,
}

impl ArenaBuffer<'_> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies the buffer out of the arena as UTF-8 text.
    pub fn to_owned_string(&self) -> Result<String> {
        std::str::from_utf8(&self.bytes)
            .map(str::to_owned)
            .map_err(QueryParserError::render)
    }
}

impl io::Write for ArenaBuffer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod arena_tests {
    use std::io::Write;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::initialize_runtime;

    fn init() {
        initialize_runtime(RuntimeConfig::default()).unwrap();
    }

    #[test]
    fn test_scoped_arena_switches_and_restores_context() {
        init();
        assert_eq!(current_context(), ROOT_CONTEXT);
        let seen = with_scoped_arena("call", |arena| {
            assert_eq!(arena.depth(), 0);
            (current_context(), context_depth(), live_arenas())
        })
        .unwrap();
        assert_eq!(seen, ("call", 1, 1));
        assert_eq!(current_context(), ROOT_CONTEXT);
        assert_eq!(context_depth(), 0);
        assert_eq!(live_arenas(), 0);
    }

    #[test]
    fn test_child_arena_nests_under_parent() {
        init();
        with_scoped_arena("call", |arena| {
            let child = arena.child("serialize").unwrap();
            assert_eq!(child.parent(), Some(arena.id()));
            assert_eq!(child.depth(), 1);
            {
                let _current = child.make_current();
                assert_eq!(current_context(), "serialize");
                assert_eq!(context_depth(), 2);
            }
            assert_eq!(current_context(), "call");
            assert_eq!(live_arenas(), 2);
        })
        .unwrap();
        assert_eq!(live_arenas(), 0);
    }

    #[test]
    fn test_cleanup_runs_when_body_panics() {
        init();
        let result = catch_unwind(AssertUnwindSafe(|| {
            with_scoped_arena("doomed", |_| panic!("boom")).unwrap();
        }));
        assert!(result.is_err());
        assert_eq!(current_context(), ROOT_CONTEXT);
        assert_eq!(context_depth(), 0);
        assert_eq!(live_arenas(), 0);
    }

    #[test]
    fn test_open_failure_is_arena_exhausted() {
        let err = CallArena::open("huge", usize::MAX).unwrap_err();
        assert!(matches!(err, QueryParserError::ArenaExhausted { capacity } if capacity == usize::MAX));
        assert_eq!(live_arenas(), 0);
    }

    #[test]
    fn test_alloc_str_lives_in_arena() {
        let arena = CallArena::open("helpers", 64).unwrap();
        let copy = arena.alloc_str("SELECT 1");
        assert_eq!(copy, "SELECT 1");
        assert!(arena.allocated_bytes() >= copy.len());
    }

    #[test]
    fn test_buffer_copies_out() {
        let arena = CallArena::open("buffer", 0).unwrap();
        let mut buffer = arena.buffer();
        assert!(buffer.is_empty());
        write!(buffer, "[{}]", 42).unwrap();
        let owned = buffer.to_owned_string().unwrap();
        drop(buffer);
        drop(arena);
        assert_eq!(owned, "[42]");
    }

    #[test]
    fn test_buffer_rejects_invalid_utf8() {
        let arena = CallArena::open("buffer", 0).unwrap();
        let mut buffer = arena.buffer();
        buffer.write_all(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            buffer.to_owned_string(),
            Err(QueryParserError::Render { .. })
        ));
    }
}
