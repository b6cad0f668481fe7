use strum::Display;

const READ_KEYWORD: &str = "SELECT";

/// Whether a command produces rows. Decides the shape of the response, not how the command is
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Read,
    Write,
}

/// The text of one inbound frame, passed verbatim to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Command {
        Command { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn kind(&self) -> Kind {
        let text = self.text.trim_start();
        let is_read = text
            .get(..READ_KEYWORD.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(READ_KEYWORD));

        if is_read {
            Kind::Read
        } else {
            Kind::Write
        }
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::new(text)
    }
}
