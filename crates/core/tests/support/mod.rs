//! Shared fixtures for core integration tests.

pub mod repositories;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use punchclock_core::{RolloverSweeper, TimeclockService};
use repositories::{
    InMemoryActivityLog, InMemoryOutbox, InMemorySessionRepository, InMemoryTaskCatalog,
    InMemoryUserDirectory,
};

pub struct Harness {
    pub service: TimeclockService,
    pub sweeper: RolloverSweeper,
    pub sessions: Arc<InMemorySessionRepository>,
    pub tasks: Arc<InMemoryTaskCatalog>,
    pub users: Arc<InMemoryUserDirectory>,
    pub outbox: Arc<InMemoryOutbox>,
    pub activity: Arc<InMemoryActivityLog>,
}

pub fn harness() -> Harness {
    let sessions = Arc::new(InMemorySessionRepository::default());
    let tasks = Arc::new(InMemoryTaskCatalog::default());
    let users = Arc::new(InMemoryUserDirectory::default());
    let outbox = Arc::new(InMemoryOutbox::default());
    let activity = Arc::new(InMemoryActivityLog::default());

    let service = TimeclockService::new(
        sessions.clone(),
        tasks.clone(),
        users.clone(),
        outbox.clone(),
        activity.clone(),
    );
    let sweeper = RolloverSweeper::new(sessions.clone());

    Harness { service, sweeper, sessions, tasks, users, outbox, activity }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, 0).expect("valid time")
}
