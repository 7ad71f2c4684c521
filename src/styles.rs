//! Communication style presets the adapter can rewrite replies into.
//!
//! Each preset pairs a style name with its definition and the survey items
//! used to measure it. The active preset is fixed per server by index.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StyleDescriptor {
    pub name: &'static str,
    pub definition: &'static str,
    pub survey_items: &'static str,
}

pub const STYLES: [StyleDescriptor; 6] = [
    StyleDescriptor {
        name: "authoritative",
        definition: "Authoritative is the tendency to command or demand others in a conversation.",
        survey_items: "I am very likely to tell someone what they should do; I sometimes insist that others do what I say; \
I expect people to obey when I ask them to do something; When I feel others should do something for me, I ask for it in a demanding tone of voice.",
    },
    StyleDescriptor {
        name: "talkative",
        definition: "Talkativeness is a tendency to initiate a conversation, talk a lot, and avoid silence in a conversation.",
        survey_items: "I always have a lot to say; I have a hard time keeping myself silent when around other people; \
I am never the one who breaks a silence by starting to talk; I like to talk a lot.",
    },
    StyleDescriptor {
        name: "sentimentality",
        definition: "Sentimentality is a tendency to express one's own emotions or display empathic emotional responses to others in a conversation.",
        survey_items: "When I see others cry, I have difficulty holding back my tears; During a conversation, I am easily overcome by emotions; \
When describing my memories, I sometimes get visibly emotional; People can tell that I am emotionally touched by some topics of conversation.",
    },
    StyleDescriptor {
        name: "conversational dominance",
        definition: "Conversational dominance is the tendency to take the lead in a conversation and determine its topics and directions.",
        survey_items: "I often take the lead in a conversation; I often determine which topics are talked about during a conversation; \
I often determine the direction of a conversation.",
    },
    StyleDescriptor {
        name: "informality",
        definition: "Informality is a tendency to talk casually and avoid being formal, distant, or stiff in a conversation.",
        survey_items: "I communicate with others in a distant manner; I behave somewhat formally when I meet someone; \
I address others in a very casual way; I come across as somewhat stiff when dealing with people.",
    },
    StyleDescriptor {
        name: "conciseness",
        definition: "Conciseness is the tendency to use as few words as possible to clearly convey ideas and explain things in a conversation, and avoid being long-winded.",
        survey_items: "I don't need a lot of words to get my message across; Most of the time, I only need a few words to explain something; \
I am somewhat long-winded when I need to explain something; With a few words I can usually clarify my point to everybody.",
    },
];

/// Look up a preset by its fixed index.
pub fn by_index(index: usize) -> Option<&'static StyleDescriptor> {
    STYLES.get(index)
}

/// Clap value parser that rejects indices outside the preset table.
pub fn parse_style_index(raw: &str) -> Result<usize, String> {
    let index: usize = raw
        .parse()
        .map_err(|_| format!("'{}' is not a style index", raw))?;
    if index < STYLES.len() {
        Ok(index)
    } else {
        Err(format!(
            "style index must be between 0 and {}",
            STYLES.len() - 1
        ))
    }
}
