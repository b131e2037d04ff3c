// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AlertLevel, AppMode, DialogKind, EntityKind, Notification};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// `None` for plain informational text.
    pub level: Option<AlertLevel>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_tab: EntityKind,
    pub status: Option<StatusLine>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Table,
            active_tab: EntityKind::Roles,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    NextTab,
    PrevTab,
    OpenDialog(DialogKind),
    CloseDialog,
    Info(String),
    Notify(Notification),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    TabChanged(EntityKind),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::OpenDialog(kind) => {
                self.mode = AppMode::Dialog(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::CloseDialog => {
                self.mode = AppMode::Table;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::Info(text) => vec![self.set_status(None, text)],
            AppCommand::Notify(notification) => {
                vec![self.set_status(Some(notification.level), notification.to_string())]
            }
            AppCommand::ClearStatus => {
                self.status = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        if matches!(self.mode, AppMode::Dialog(_)) {
            return Vec::new();
        }
        let tabs = EntityKind::ALL;
        let current = tabs
            .iter()
            .position(|tab| *tab == self.active_tab)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_tab = tabs[next];
        vec![AppEvent::TabChanged(self.active_tab)]
    }

    fn set_status(&mut self, level: Option<AlertLevel>, text: String) -> AppEvent {
        self.status = Some(StatusLine {
            level,
            text: text.clone(),
        });
        AppEvent::StatusUpdated(text)
    }
}
