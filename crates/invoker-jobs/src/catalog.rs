//! Explicit job registration.

use crate::job::Job;
use crate::types::Policy;

/// Builds a fresh job instance; a failure skips that job only.
pub type JobFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Job>> + Send + Sync>;

pub struct JobDescriptor {
    pub name: String,
    pub policy: Policy,
    factory: JobFactory,
}

impl JobDescriptor {
    pub fn instantiate(&self) -> anyhow::Result<Box<dyn Job>> {
        (self.factory)()
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Ordered list of job descriptors. The scheduler evaluates them in
/// registration order.
#[derive(Debug, Default)]
pub struct JobCatalog {
    descriptors: Vec<JobDescriptor>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, J>(&mut self, name: impl Into<String>, policy: Policy, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<J> + Send + Sync + 'static,
        J: Job,
    {
        self.descriptors.push(JobDescriptor {
            name: name.into(),
            policy,
            factory: Box::new(move || factory().map(|job| Box::new(job) as Box<dyn Job>)),
        });
        self
    }

    pub fn on_start<F, J>(&mut self, name: impl Into<String>, run_async: bool, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<J> + Send + Sync + 'static,
        J: Job,
    {
        self.register(name, Policy::Startup { run_async }, factory)
    }

    pub fn every<F, J>(&mut self, name: impl Into<String>, every: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<J> + Send + Sync + 'static,
        J: Job,
    {
        self.register(name, Policy::Interval { every: every.into() }, factory)
    }

    pub fn on<F, J>(&mut self, name: impl Into<String>, expression: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<J> + Send + Sync + 'static,
        J: Job,
    {
        self.register(
            name,
            Policy::Cron {
                expression: expression.into(),
            },
            factory,
        )
    }

    pub fn on_stop<F, J>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<J> + Send + Sync + 'static,
        J: Job,
    {
        self.register(name, Policy::Stop, factory)
    }

    pub fn descriptors(&self) -> &[JobDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
