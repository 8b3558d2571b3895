//! Formato de texto para respuestas y avisos del bot.

pub mod text;
