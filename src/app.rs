use airb_core::{ApiState, FsContentResolver, GeminiClient, ImageHandle, ReplyController};
use tokio::task::JoinHandle;

pub type Controller = ReplyController<GeminiClient, FsContentResolver>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Guide,
    Picker,
    Send,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Guide => Focus::Picker,
            Focus::Picker => Focus::Send,
            Focus::Send => Focus::Guide,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::Guide => Focus::Send,
            Focus::Picker => Focus::Guide,
            Focus::Send => Focus::Picker,
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line editable text with a character cursor
#[derive(Debug, Clone, Default)]
pub struct TextField {
    pub value: String,
    pub cursor: usize,
}

impl TextField {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }
}

pub struct App {
    pub should_quit: bool,
    pub focus: Focus,

    // Editable fields
    pub guide: TextField,
    pub picker: TextField,

    // Mirrors of the controller, refreshed by sync_state
    pub api_state: ApiState,
    pub response_text: String,
    pub selected_image: Option<ImageHandle>,

    pub controller: Controller,
    pub send_task: Option<JoinHandle<ApiState>>,
    pub model: String,

    // Animation state
    pub animation_frame: u8,
}

impl App {
    pub fn new(controller: Controller, model: String) -> Self {
        Self {
            should_quit: false,
            focus: Focus::Guide,
            guide: TextField::default(),
            picker: TextField::default(),
            api_state: controller.state(),
            response_text: controller.response_text(),
            selected_image: controller.selected_image(),
            controller,
            send_task: None,
            model,
            animation_frame: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.api_state.is_loading()
    }

    /// Pull the controller's observable values into the view model
    pub fn sync_state(&mut self) {
        self.api_state = self.controller.state();
        self.response_text = self.controller.response_text();
        self.selected_image = self.controller.selected_image();

        if self.send_task.as_ref().is_some_and(|task| task.is_finished()) {
            self.send_task = None;
        }
    }

    /// Push the edited guide text to the controller
    pub fn commit_guide(&mut self) {
        self.controller.set_guide_text(self.guide.value.clone());
    }

    /// Deliver the picker field as the picker result; blank means cancelled
    pub fn pick_image(&mut self) {
        let raw = self.picker.value.trim();
        let handle = if raw.is_empty() {
            None
        } else {
            Some(ImageHandle::new(raw))
        };
        if self.controller.pick_image(handle) {
            self.sync_state();
        }
    }

    pub fn send(&mut self) {
        self.commit_guide();
        if let Some(task) = self.controller.spawn_send() {
            self.send_task = Some(task);
        }
        self.sync_state();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 4;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(text: &str) -> TextField {
        TextField {
            value: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    #[test]
    fn test_insert_at_cursor_handles_multibyte() {
        let mut f = field("héllo");
        f.home();
        f.right();
        f.right();
        f.insert('X');
        assert_eq!(f.value, "héXllo");
        assert_eq!(f.cursor, 3);
    }

    #[test]
    fn test_backspace_and_delete() {
        let mut f = field("añb");
        f.backspace();
        assert_eq!(f.value, "añ");
        f.home();
        f.delete();
        assert_eq!(f.value, "ñ");
        f.backspace();
        assert_eq!(f.value, "ñ");
    }

    #[test]
    fn test_cursor_clamps() {
        let mut f = field("ab");
        f.right();
        assert_eq!(f.cursor, 2);
        f.home();
        f.left();
        assert_eq!(f.cursor, 0);
        f.end();
        assert_eq!(f.cursor, 2);
    }

    #[test]
    fn test_focus_cycles_both_ways() {
        assert_eq!(Focus::Guide.next().next().next(), Focus::Guide);
        assert_eq!(Focus::Guide.prev(), Focus::Send);
        assert_eq!(Focus::Picker.prev(), Focus::Guide);
    }
}
