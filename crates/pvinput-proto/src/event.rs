//! Tagged input-event records.
//!
//! Each record is [`EVENT_WORDS`](crate::page::EVENT_WORDS) 32-bit words;
//! word 0 carries the tag and the remaining words carry the payload of the
//! variant it selects. Decoding is total: a record with an unrecognized tag
//! (including the reserved tag 2) decodes to [`InputEvent::Unknown`] so a
//! malformed entry can never abort a drain pass.

use crate::page::EVENT_WORDS;

/// Relative pointer motion.
pub const TAG_MOTION: u32 = 1;
/// Reserved by the protocol; never produced by a conforming backend.
pub const TAG_RESERVED: u32 = 2;
/// Key or button press/release.
pub const TAG_KEY: u32 = 3;
/// Absolute pointer position.
pub const TAG_POSITION: u32 = 4;
/// Multi-touch contact update.
pub const TAG_MULTI_TOUCH: u32 = 5;

/// One input event, copied out of the shared page and never aliased after
/// the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Motion {
        rel_x: i32,
        rel_y: i32,
        rel_z: i32,
    },
    Key {
        keycode: u32,
        pressed: bool,
    },
    Position {
        abs_x: i32,
        abs_y: i32,
        rel_z: i32,
    },
    MultiTouch {
        event_type: u32,
        contact_id: u32,
        abs_x: i32,
        abs_y: i32,
    },
    Unknown {
        tag: u32,
    },
}

impl InputEvent {
    /// Wire tag for this event.
    pub fn tag(&self) -> u32 {
        match self {
            InputEvent::Motion { .. } => TAG_MOTION,
            InputEvent::Key { .. } => TAG_KEY,
            InputEvent::Position { .. } => TAG_POSITION,
            InputEvent::MultiTouch { .. } => TAG_MULTI_TOUCH,
            InputEvent::Unknown { tag } => *tag,
        }
    }

    /// Decode a record read out of the ring. Total; see the module docs.
    pub fn decode(words: [u32; EVENT_WORDS]) -> Self {
        match words[0] {
            TAG_MOTION => InputEvent::Motion {
                rel_x: words[1] as i32,
                rel_y: words[2] as i32,
                rel_z: words[3] as i32,
            },
            TAG_KEY => InputEvent::Key {
                pressed: words[1] != 0,
                keycode: words[2],
            },
            TAG_POSITION => InputEvent::Position {
                abs_x: words[1] as i32,
                abs_y: words[2] as i32,
                rel_z: words[3] as i32,
            },
            TAG_MULTI_TOUCH => InputEvent::MultiTouch {
                event_type: words[1],
                contact_id: words[2],
                abs_x: words[3] as i32,
                abs_y: words[4] as i32,
            },
            tag => InputEvent::Unknown { tag },
        }
    }

    /// Encode into record words (the producer side of [`Self::decode`]).
    pub fn encode(&self) -> [u32; EVENT_WORDS] {
        let mut words = [0u32; EVENT_WORDS];
        words[0] = self.tag();
        match *self {
            InputEvent::Motion {
                rel_x,
                rel_y,
                rel_z,
            } => {
                words[1] = rel_x as u32;
                words[2] = rel_y as u32;
                words[3] = rel_z as u32;
            }
            InputEvent::Key { keycode, pressed } => {
                words[1] = pressed as u32;
                words[2] = keycode;
            }
            InputEvent::Position {
                abs_x,
                abs_y,
                rel_z,
            } => {
                words[1] = abs_x as u32;
                words[2] = abs_y as u32;
                words[3] = rel_z as u32;
            }
            InputEvent::MultiTouch {
                event_type,
                contact_id,
                abs_x,
                abs_y,
            } => {
                words[1] = event_type;
                words[2] = contact_id;
                words[3] = abs_x as u32;
                words[4] = abs_y as u32;
            }
            InputEvent::Unknown { .. } => {}
        }
        words
    }
}
