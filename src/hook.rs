//! Process-wide input provider with scoped overrides.
//!
//! Whoever needs a line of operator input calls [`input`]. By default that
//! reads from stdin; [`install`] swaps in another provider until the returned
//! guard is dropped, on every exit path including panics.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

pub trait InputProvider {
    /// Answer one prompt with one line, without the trailing newline
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;
}

pub type SharedProvider = Rc<RefCell<dyn InputProvider>>;

thread_local! {
    static CURRENT: RefCell<Option<SharedProvider>> = const { RefCell::new(None) };
}

/// Reads answers from the real terminal
#[derive(Debug, Default)]
pub struct StdinProvider;

impl InputProvider for StdinProvider {
    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for input",
            ));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Restores the previously installed provider when dropped
#[must_use = "the provider is uninstalled as soon as the guard is dropped"]
pub struct HookGuard {
    previous: Option<SharedProvider>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
        tracing::debug!("input hook restored");
    }
}

pub fn install(provider: SharedProvider) -> HookGuard {
    let previous = CURRENT.with(|slot| slot.borrow_mut().replace(provider));
    tracing::debug!("input hook installed");
    HookGuard { previous }
}

/// Run `f` with `provider` answering every [`input`] call
pub fn with_provider<T>(provider: SharedProvider, f: impl FnOnce() -> T) -> T {
    let _guard = install(provider);
    f()
}

/// The provider currently installed on this thread, if any
pub fn current() -> Option<SharedProvider> {
    CURRENT.with(|slot| slot.borrow().clone())
}

pub fn input(prompt: &str) -> io::Result<String> {
    match current() {
        Some(provider) => provider.borrow_mut().read_line(prompt),
        None => StdinProvider.read_line(prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl InputProvider for Fixed {
        fn read_line(&mut self, _prompt: &str) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn fixed(answer: &'static str) -> SharedProvider {
        Rc::new(RefCell::new(Fixed(answer)))
    }

    #[test]
    fn installed_provider_answers() {
        let answer = with_provider(fixed("yes"), || input("go?").unwrap());
        assert_eq!(answer, "yes");
        assert!(current().is_none());
    }

    #[test]
    fn nested_overrides_unwind_in_order() {
        let outer = fixed("outer");
        let _outer_guard = install(outer.clone());
        {
            let _inner = install(fixed("inner"));
            assert_eq!(input("").unwrap(), "inner");
        }
        assert_eq!(input("").unwrap(), "outer");
        assert!(Rc::ptr_eq(&current().unwrap(), &outer));
    }

    #[test]
    fn error_return_restores_previous() {
        let original = fixed("original");
        let _guard = install(original.clone());

        let result: Result<(), String> =
            with_provider(fixed("scripted"), || Err("delegate blew up".to_string()));

        assert!(result.is_err());
        assert!(Rc::ptr_eq(&current().unwrap(), &original));
    }

    #[test]
    fn panic_restores_previous() {
        let original = fixed("original");
        let _guard = install(original.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_provider(fixed("scripted"), || panic!("delegate panicked"))
        }));

        assert!(outcome.is_err());
        assert!(Rc::ptr_eq(&current().unwrap(), &original));
    }
}
