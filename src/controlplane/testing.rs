//! Scripted helper runtime used by the control plane tests

use crate::domain::ports::{HelperRuntime, HelperUnitSpec, UnitPhase};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};

/// One scripted answer to a phase query
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Phase(UnitPhase),
    QueryError,
}

/// In-memory runtime answering phase queries from a script
pub struct ScriptedRuntime {
    script: Mutex<VecDeque<Step>>,
    /// Answer once the script runs out
    idle_phase: UnitPhase,
    fail_create: bool,
    fail_delete: bool,
    live: Mutex<BTreeSet<String>>,
    pub created: Mutex<Vec<HelperUnitSpec>>,
    pub deleted: Mutex<Vec<String>>,
    pub queries: Mutex<u32>,
}

impl ScriptedRuntime {
    pub fn new(script: Vec<Step>, idle_phase: UnitPhase) -> Self {
        Self {
            script: Mutex::new(script.into()),
            idle_phase,
            fail_create: false,
            fail_delete: false,
            live: Mutex::new(BTreeSet::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            queries: Mutex::new(0),
        }
    }

    /// Succeeds on the first phase query
    pub fn succeeding() -> Self {
        Self::new(vec![], UnitPhase::Succeeded)
    }

    /// Never leaves the given phase
    pub fn stuck(phase: UnitPhase) -> Self {
        Self::new(vec![], phase)
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Pretend a helper pod with this name is already running
    pub fn with_live_unit(self, name: &str) -> Self {
        self.live.lock().insert(name.to_string());
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().len()
    }

    pub fn query_count(&self) -> u32 {
        *self.queries.lock()
    }
}

#[async_trait]
impl HelperRuntime for ScriptedRuntime {
    async fn create_unit(&self, spec: &HelperUnitSpec) -> Result<()> {
        if self.fail_create {
            return Err(Error::Execution("create rejected".into()));
        }
        if !self.live.lock().insert(spec.name.clone()) {
            return Err(Error::ResourceExists {
                kind: "Pod".into(),
                name: spec.name.clone(),
            });
        }
        self.created.lock().push(spec.clone());
        Ok(())
    }

    async fn unit_phase(&self, _name: &str) -> Result<UnitPhase> {
        *self.queries.lock() += 1;
        match self.script.lock().pop_front() {
            Some(Step::Phase(phase)) => Ok(phase),
            Some(Step::QueryError) => Err(Error::Execution("status query failed".into())),
            None => Ok(self.idle_phase),
        }
    }

    async fn delete_unit(&self, name: &str) -> Result<()> {
        self.deleted.lock().push(name.to_string());
        self.live.lock().remove(name);
        if self.fail_delete {
            return Err(Error::Execution("delete rejected".into()));
        }
        Ok(())
    }
}
