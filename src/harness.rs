//! Test-case harness.
//!
//! Runs a batch of drift case files the way a test runner would: each
//! case gets a fresh interpreter, `assert` statements are rewritten to
//! carry their source text, and deprecation edits from all cases flow
//! into one shared recorder that is activated around each case. The
//! recorder is only flushed to disk when every case passed and fix
//! mode is on, so sources are never rewritten under a failing suite.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use driftfix_core::ledger::{ChangeRecorder, FixOutcome};
use driftfix_lang::compiler::compile_module;
use driftfix_lang::hooks::RewriteHook;
use driftfix_lang::parser::parse;
use driftfix_lang::vm::Interpreter;
use driftfix_lang::AssertRewriteHook;

use crate::session::{install, Session, SessionRef};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug)]
pub enum CaseOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug)]
pub struct CaseResult {
    pub file: PathBuf,
    pub outcome: CaseOutcome,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, CaseOutcome::Passed)
    }
}

#[derive(Debug)]
pub struct HarnessReport {
    pub cases: Vec<CaseResult>,
    pub warnings: Vec<String>,
    /// Per-file fix results, when fixing ran.
    pub fixes: Vec<FixOutcome>,
    /// Fix summary line, when fixing ran.
    pub summary: Option<String>,
}

impl HarnessReport {
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(CaseResult::passed)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    session: SessionRef,
    recorder: Rc<RefCell<ChangeRecorder>>,
    fix: bool,
    cases: Vec<CaseResult>,
}

impl Harness {
    pub fn new(fix: bool) -> Self {
        let session = Session::new();
        // case code runs assert-rewritten; the resolver needs the same
        // rewrite available when correlating
        session.borrow_mut().hooks.register(Rc::new(AssertRewriteHook));
        Harness {
            session,
            recorder: Rc::new(RefCell::new(ChangeRecorder::new())),
            fix,
            cases: Vec::new(),
        }
    }

    /// Run one case file. Failures are captured per case; the harness
    /// always continues with the next one.
    pub fn run_case(&mut self, file: &Path) {
        let outcome = self.execute(file);
        self.cases.push(CaseResult {
            file: file.to_path_buf(),
            outcome,
        });
    }

    fn execute(&mut self, file: &Path) -> CaseOutcome {
        let source = match fs::read_to_string(file) {
            Ok(source) => source,
            Err(err) => return CaseOutcome::Failed(format!("{}: {err}", file.display())),
        };
        let mut module = match parse(&source, file) {
            Ok(module) => module,
            Err(err) => return CaseOutcome::Failed(err.to_string()),
        };
        AssertRewriteHook.apply(&mut module, &source);
        let code = match compile_module(&module, file) {
            Ok(code) => code,
            Err(err) => return CaseOutcome::Failed(err.to_string()),
        };

        let mut interp = Interpreter::new();
        install(&self.session, &mut interp);
        interp.sources.insert(file, &source);

        self.session
            .borrow_mut()
            .recorders
            .activate(Rc::clone(&self.recorder));
        let result = interp.run_module(code);
        self.session.borrow_mut().recorders.deactivate();

        match result {
            Ok(_) => CaseOutcome::Passed,
            Err(err) => CaseOutcome::Failed(err.to_string()),
        }
    }

    /// Consume the harness; fix recorded edits if every case passed.
    pub fn finish(self) -> HarnessReport {
        let warnings = self.session.borrow().warnings.clone();
        let all_passed = self.cases.iter().all(CaseResult::passed);
        let mut report = HarnessReport {
            cases: self.cases,
            warnings,
            fixes: Vec::new(),
            summary: None,
        };
        if self.fix && all_passed {
            let recorder = self.recorder.borrow();
            let count = recorder.distinct_change_count();
            report.fixes = recorder.fix_all(true);
            report.summary = Some(format!("{count} fixes where done by driftfix"));
        }
        report
    }
}

// ============================================================================
// Tests
// ============================================================================
