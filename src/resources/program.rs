//! Content-addressed shader programs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{DisposeQueue, DisposeRunner, ResourceId};

struct ProgramInner {
    id: ResourceId,
    name: String,
    vertex: String,
    fragment: String,
    dispose: DisposeRunner,
}

impl Drop for ProgramInner {
    fn drop(&mut self) {
        self.dispose.emit(self.id);
    }
}

thread_local! {
    static PROGRAM_CACHE: RefCell<HashMap<String, Weak<ProgramInner>>> =
        RefCell::new(HashMap::new());
}

/// An immutable pair of shader sources.
///
/// Identical sources share one program, so the device program and its
/// reflection data are built once per context no matter how many call sites
/// ask for them.
#[derive(Clone)]
pub struct Program {
    inner: Rc<ProgramInner>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Program {
    /// Look up or create the program for these sources.
    ///
    /// `name` labels compile errors; it is ignored when the sources are
    /// already cached.
    pub fn from_sources(vertex: &str, fragment: &str, name: &str) -> Self {
        let key = format!("{vertex}{fragment}");
        PROGRAM_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some(inner) = cache.get(&key).and_then(Weak::upgrade) {
                return Self { inner };
            }
            cache.retain(|_, weak| weak.strong_count() > 0);
            let inner = Rc::new(ProgramInner {
                id: ResourceId::next(),
                name: name.to_owned(),
                vertex: vertex.to_owned(),
                fragment: fragment.to_owned(),
                dispose: DisposeRunner::default(),
            });
            cache.insert(key, Rc::downgrade(&inner));
            Self { inner }
        })
    }

    /// Identity of this program.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Label used in diagnostics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Vertex stage source, without precision header.
    pub fn vertex_source(&self) -> &str {
        &self.inner.vertex
    }

    /// Fragment stage source, without precision header.
    pub fn fragment_source(&self) -> &str {
        &self.inner.fragment
    }

    /// Release device programs in every context.
    pub fn dispose(&self) {
        self.inner.dispose.emit(self.inner.id);
    }

    pub(crate) fn on_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.add(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sources_share_a_program() {
        let a = Program::from_sources("void main() {}", "void main() { }", "a");
        let b = Program::from_sources("void main() {}", "void main() { }", "b");
        assert_eq!(a, b);
        assert_eq!(b.name(), "a");

        let c = Program::from_sources("void main() {}", "void main() {  }", "c");
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn dropped_programs_leave_the_cache() {
        let id = Program::from_sources("attribute float x;", "", "tmp").id();
        let again = Program::from_sources("attribute float x;", "", "tmp");
        assert_ne!(again.id(), id);
    }
}
