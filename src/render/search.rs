/// Live-search input on the Logs view.
///
/// `cursor` and `anchor` are char indices into `text`. A selection exists
/// when `anchor` is set and differs from `cursor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchBox {
    pub text: String,
    pub focused: bool,
    pub cursor: usize,
    pub anchor: Option<usize>,
}

impl SearchBox {
    /// Fresh, unfocused box with the caret at the end.
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string(), focused: false, cursor: text.chars().count(), anchor: None }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.text.char_indices().nth(char_idx).map(|(i, _)| i).unwrap_or(self.text.len())
    }

    pub fn selection(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        (anchor != self.cursor).then(|| (anchor.min(self.cursor), anchor.max(self.cursor)))
    }

    fn delete_selection(&mut self) -> bool {
        let Some((start, end)) = self.selection() else {
            self.anchor = None;
            return false;
        };
        let (from, to) = (self.byte_index(start), self.byte_index(end));
        self.text.replace_range(from..to, "");
        self.cursor = start;
        self.anchor = None;
        true
    }

    pub fn insert(&mut self, c: char) {
        self.delete_selection();
        let at = self.byte_index(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.delete_selection() || self.cursor == 0 {
            return;
        }
        let (from, to) = (self.byte_index(self.cursor - 1), self.byte_index(self.cursor));
        self.text.replace_range(from..to, "");
        self.cursor -= 1;
    }

    fn move_to(&mut self, target: usize, extend: bool) {
        if extend {
            self.anchor.get_or_insert(self.cursor);
        } else {
            self.anchor = None;
        }
        self.cursor = target.min(self.len());
    }

    pub fn left(&mut self, extend: bool) {
        self.move_to(self.cursor.saturating_sub(1), extend);
    }

    pub fn right(&mut self, extend: bool) {
        self.move_to(self.cursor + 1, extend);
    }

    pub fn home(&mut self, extend: bool) {
        self.move_to(0, extend);
    }

    pub fn end(&mut self, extend: bool) {
        self.move_to(self.len(), extend);
    }

    /// Keep caret and anchor inside the current text.
    pub fn clamp(&mut self) {
        let len = self.len();
        self.cursor = self.cursor.min(len);
        self.anchor = self.anchor.map(|a| a.min(len));
    }
}
