use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mutscope::mutants::MutantResult;
use mutscope::views::{LogView, Notifier, Observer};

#[derive(Default)]
struct Tally {
    seen: Rc<RefCell<Vec<String>>>,
}

impl Observer for Tally {
    fn killed(&mut self, number: usize, killer: Option<&str>, _trace: &str, _duration: Duration, _tests_run: usize) {
        self.seen
            .borrow_mut()
            .push(format!("killed {number} {}", killer.unwrap_or("-")));
    }

    fn survived(&mut self, number: usize, _duration: Duration, tests_run: usize) {
        self.seen.borrow_mut().push(format!("survived {number} {tests_run}"));
    }

    fn timeout(&mut self, number: usize) {
        self.seen.borrow_mut().push(format!("timeout {number}"));
    }

    fn incompetent(&mut self, number: usize, detail: &str, _tests_run: Option<usize>) {
        self.seen.borrow_mut().push(format!("incompetent {number} {detail}"));
    }
}

#[test]
fn outcome_dispatches_by_status_to_every_view() {
    let first = Rc::new(RefCell::new(Vec::new()));
    let second = Rc::new(RefCell::new(Vec::new()));
    let mut notifier = Notifier::new();
    assert!(notifier.is_empty());
    notifier.add(Box::new(Tally { seen: Rc::clone(&first) }));
    notifier.add(Box::new(LogView));
    notifier.add(Box::new(Tally { seen: Rc::clone(&second) }));
    assert_eq!(notifier.len(), 3);

    let results = [
        MutantResult::Killed {
            duration: Duration::from_millis(3),
            killer: Some("t.py::test_a".into()),
            trace: "assert".into(),
            tests_run: 2,
        },
        MutantResult::Survived {
            duration: Duration::from_millis(3),
            tests_run: 0,
        },
        MutantResult::Timeout,
        MutantResult::Incompetent {
            detail: "SyntaxError".into(),
            tests_run: None,
        },
    ];
    for (i, result) in results.iter().enumerate() {
        notifier.outcome(i + 1, result);
    }

    let expected = vec![
        "killed 1 t.py::test_a",
        "survived 2 0",
        "timeout 3",
        "incompetent 4 SyntaxError",
    ];
    assert_eq!(*first.borrow(), expected);
    assert_eq!(*second.borrow(), expected);
}
