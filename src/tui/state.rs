//! UI-thread state and input handling.
//!
//! Nothing here touches the terminal: keys and controller events go in, `UiCommand`s
//! come out. `run_threaded` forwards those to the controller and draws the state.

use crate::coordinator::{Coordinator, Effect, SubView};
use crate::editor::EditorState;
use crate::lifecycle::{GrantTerms, SessionState};
use crate::model::{AppEvent, SoftwareLicense};
use crate::notify::{Notice, NoticeLevel};
use crate::orchestrator::UiCommand;
use crate::query::{QueryEngine, PAGE_SIZE_OPTIONS};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    Table,
    Search,
}

/// What the event loop must do after a key press.
#[derive(Debug, Default)]
pub(crate) struct KeyOutcome {
    pub commands: Vec<UiCommand>,
    pub quit: bool,
    pub copy: Option<String>,
}

impl KeyOutcome {
    fn commands(commands: Vec<UiCommand>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }
}

pub(crate) struct UiState {
    pub query: QueryEngine,
    pub coordinator: Coordinator,
    pub selected: usize,
    pub focus: Focus,
    pub show_help: bool,
    pub info: String,
    pub info_level: NoticeLevel,
}

impl UiState {
    pub fn new(page_size: usize, base: &str, terms: GrantTerms) -> Self {
        Self {
            query: QueryEngine::new(page_size),
            coordinator: Coordinator::new(base, terms),
            selected: 0,
            focus: Focus::Table,
            show_help: false,
            info: String::new(),
            info_level: NoticeLevel::Info,
        }
    }

    /// First list load, plus the sub-view named by `open` if any.
    pub fn start(&mut self, open: Option<&str>) -> Vec<UiCommand> {
        let mut commands = vec![UiCommand::LoadList(self.query.refresh())];
        if let Some(address) = open {
            match self.coordinator.navigate_to_address(address) {
                Ok(effects) => commands.extend(self.run_effects(effects)),
                Err(e) => self.set_info(format!("Cannot open {address}: {e}")),
            }
        }
        commands
    }

    pub fn selected_license(&self) -> Option<&SoftwareLicense> {
        self.query.rows().get(self.selected)
    }

    /// Show a notice in the status bar, replacing the previous one.
    pub fn push_notice(&mut self, notice: Notice) {
        self.info = notice.to_message();
        self.info_level = notice.level;
    }

    fn set_info(&mut self, message: impl Into<String>) {
        self.info = message.into();
        self.info_level = NoticeLevel::Info;
    }

    fn run_effects(&mut self, effects: Vec<Effect>) -> Vec<UiCommand> {
        effects
            .into_iter()
            .map(|effect| match effect {
                Effect::FetchLicense {
                    session,
                    license_id,
                } => UiCommand::LoadLicense {
                    session,
                    license_id,
                },
                Effect::RefreshList => UiCommand::LoadList(self.query.refresh()),
            })
            .collect()
    }

    fn list_commands(&mut self, fetch: Option<crate::query::Fetch>) -> Vec<UiCommand> {
        match fetch {
            Some(fetch) => {
                self.selected = 0;
                vec![UiCommand::LoadList(fetch)]
            }
            None => Vec::new(),
        }
    }

    pub fn apply_event(&mut self, event: AppEvent) -> Vec<UiCommand> {
        match event {
            AppEvent::ListLoaded { generation, result } => {
                if self.query.on_loaded(generation, result) {
                    self.selected = self.selected.min(self.query.rows().len().saturating_sub(1));
                }
                Vec::new()
            }
            AppEvent::DetailLoaded { session, result } => {
                self.coordinator.on_license_loaded(session, result);
                Vec::new()
            }
            AppEvent::CommitFinished {
                session,
                action,
                result,
            } => {
                if result.is_ok() && self.coordinator.detail().map(|d| d.id()) == Some(session) {
                    self.push_notice(Notice {
                        level: NoticeLevel::Success,
                        message: format!("{}成功", action.label()),
                    });
                }
                let effects = self.coordinator.on_commit_finished(session, action, result);
                self.run_effects(effects)
            }
            AppEvent::SaveFinished { session, result } => {
                if result.is_ok() && self.coordinator.editor().map(|e| e.id()) == Some(session) {
                    self.push_notice(Notice {
                        level: NoticeLevel::Success,
                        message: "保存成功".into(),
                    });
                }
                let effects = self.coordinator.on_save_finished(session, result);
                self.run_effects(effects)
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyOutcome {
                commands: vec![UiCommand::Quit],
                quit: true,
                copy: None,
            };
        }
        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return KeyOutcome::default();
        }
        match self.coordinator.view() {
            Some(SubView::Detail(_)) => self.on_detail_key(key),
            Some(SubView::Editor(_)) => self.on_editor_key(key),
            None if self.focus == Focus::Search => self.on_search_key(key),
            None => self.on_table_key(key),
        }
    }

    fn on_table_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Char('q') => KeyOutcome {
                commands: vec![UiCommand::Quit],
                quit: true,
                copy: None,
            },
            KeyCode::Char('?') => {
                self.show_help = true;
                KeyOutcome::default()
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                KeyOutcome::default()
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.query.rows().len() {
                    self.selected += 1;
                }
                KeyOutcome::default()
            }
            KeyCode::Enter => match self.selected_license().map(|l| l.license_id) {
                Some(id) => {
                    let effects = self.coordinator.open_detail(id);
                    KeyOutcome::commands(self.run_effects(effects))
                }
                None => KeyOutcome::default(),
            },
            KeyCode::Char('e') => match self.selected_license().map(|l| l.license_id) {
                Some(id) => {
                    let effects = self.coordinator.open_edit(id);
                    KeyOutcome::commands(self.run_effects(effects))
                }
                None => KeyOutcome::default(),
            },
            KeyCode::Char('a') => {
                let effects = self.coordinator.open_create();
                KeyOutcome::commands(self.run_effects(effects))
            }
            KeyCode::Char('s') => {
                let next = self.query.status_filter().next();
                let fetch = self.query.set_status_filter(next);
                KeyOutcome::commands(self.list_commands(fetch))
            }
            KeyCode::Char('c') => {
                let next = self.query.search_category().next();
                self.query.set_search_category(next);
                KeyOutcome::default()
            }
            KeyCode::Char('/') => {
                self.focus = Focus::Search;
                KeyOutcome::default()
            }
            KeyCode::Right | KeyCode::Char('n') => {
                let fetch = self.query.next_page();
                KeyOutcome::commands(self.list_commands(fetch))
            }
            KeyCode::Left | KeyCode::Char('p') => {
                let fetch = self.query.prev_page();
                KeyOutcome::commands(self.list_commands(fetch))
            }
            KeyCode::Char('+') | KeyCode::Char('-') => {
                let forward = key.code == KeyCode::Char('+');
                let size = step_page_size(self.query.page_size(), forward);
                let fetch = self.query.set_page_size(size);
                KeyOutcome::commands(self.list_commands(fetch))
            }
            KeyCode::Char('r') => {
                let fetch = Some(self.query.refresh());
                KeyOutcome::commands(self.list_commands(fetch))
            }
            KeyCode::Char('y') => self.copy_key(self.selected_license().cloned()),
            _ => KeyOutcome::default(),
        }
    }

    fn on_search_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Esc => self.focus = Focus::Table,
            KeyCode::Tab => {
                let next = self.query.search_category().next();
                self.query.set_search_category(next);
            }
            KeyCode::Backspace => {
                let mut keywords = self.query.search_keywords().to_string();
                keywords.pop();
                self.query.set_search_keywords(keywords);
            }
            KeyCode::Char(c) => {
                let keywords = format!("{}{c}", self.query.search_keywords());
                self.query.set_search_keywords(keywords);
            }
            KeyCode::Enter => {
                return match self.query.submit_search() {
                    Ok(fetch) => {
                        self.focus = Focus::Table;
                        KeyOutcome::commands(self.list_commands(Some(fetch)))
                    }
                    // validation message is shown inline by the search bar
                    Err(_) => KeyOutcome::default(),
                };
            }
            _ => {}
        }
        KeyOutcome::default()
    }

    fn on_detail_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let Some(detail) = self.coordinator.detail_mut() else {
            return KeyOutcome::default();
        };
        if detail.prompt().is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let session = detail.id();
                    if let Some(command) = detail.confirm() {
                        return KeyOutcome::commands(vec![UiCommand::Commit { session, command }]);
                    }
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    detail.cancel();
                }
                _ => {}
            }
            return KeyOutcome::default();
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                let effects = self.coordinator.close();
                KeyOutcome::commands(self.run_effects(effects))
            }
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                if let Some(action) = detail.actions().get(index).copied() {
                    if let Err(e) = detail.stage(action) {
                        self.set_info(e.to_string());
                    }
                }
                KeyOutcome::default()
            }
            KeyCode::Char('e') if matches!(detail.state(), SessionState::Loaded(_)) => {
                let id = detail.license_id();
                let effects = self.coordinator.open_edit(id);
                KeyOutcome::commands(self.run_effects(effects))
            }
            KeyCode::Char('y') => {
                let license = detail.license().cloned();
                self.copy_key(license)
            }
            _ => KeyOutcome::default(),
        }
    }

    fn on_editor_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let Some(editor) = self.coordinator.editor_mut() else {
            return KeyOutcome::default();
        };
        if editor.prompt().is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let session = editor.id();
                    if let Some(intent) = editor.confirm() {
                        return KeyOutcome::commands(vec![UiCommand::Save { session, intent }]);
                    }
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    editor.cancel();
                }
                _ => {}
            }
            return KeyOutcome::default();
        }
        if key.code == KeyCode::Esc {
            // the save result must reach the coordinator
            if editor.is_saving() {
                self.set_info("保存中，请稍候");
                return KeyOutcome::default();
            }
            let effects = self.coordinator.close();
            return KeyOutcome::commands(self.run_effects(effects));
        }
        if *editor.state() != EditorState::Ready {
            return KeyOutcome::default();
        }
        let save = key.code == KeyCode::Enter
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('s'));
        if save {
            if let Err(e) = editor.stage_save() {
                self.set_info(e.to_string());
            }
            return KeyOutcome::default();
        }
        match key.code {
            KeyCode::Tab | KeyCode::Down => editor.focus_next(),
            KeyCode::BackTab | KeyCode::Up => editor.focus_prev(),
            KeyCode::Left => editor.cycle(false),
            KeyCode::Right => editor.cycle(true),
            KeyCode::Backspace => editor.backspace(),
            KeyCode::Char(' ') if editor.focus().is_choice() => editor.cycle(true),
            KeyCode::Char(c) => editor.input(c),
            _ => {}
        }
        KeyOutcome::default()
    }

    fn copy_key(&mut self, license: Option<SoftwareLicense>) -> KeyOutcome {
        match license.and_then(|l| l.license_key).filter(|k| !k.is_empty()) {
            Some(key) => KeyOutcome {
                copy: Some(key),
                ..KeyOutcome::default()
            },
            None => {
                self.set_info("No license key to copy");
                KeyOutcome::default()
            }
        }
    }
}

fn step_page_size(current: usize, forward: bool) -> usize {
    let i = PAGE_SIZE_OPTIONS
        .iter()
        .position(|s| *s == current)
        .unwrap_or(1);
    let n = PAGE_SIZE_OPTIONS.len();
    if forward {
        PAGE_SIZE_OPTIONS[(i + 1).min(n - 1)]
    } else {
        PAGE_SIZE_OPTIONS[i.saturating_sub(1)]
    }
}
