// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing prompt text and keyboard builders.
//!
//! Every string a client sees lives here, keyed by language with an
//! English fallback. Full i18n catalogs would plug in at this seam.

use parlo_core::types::{
    CallbackAction, CommandMenu, InlineButton, Keyboard, MenuCommand, ReplyButton,
};

/// A fixed prompt shown to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    SharePhone,
    AskName,
    ChooseLanguage,
    MainMenu,
    AskQuestion,
    WaitingOperator,
    PleaseRepeat,
    Closed,
    RateRequest,
    RateThanks,
}

/// Look up a prompt in the given language, falling back to English.
pub fn prompt(language: &str, which: Prompt) -> &'static str {
    match language {
        "ru" => ru(which),
        _ => en(which),
    }
}

fn en(which: Prompt) -> &'static str {
    match which {
        Prompt::SharePhone => {
            "Welcome! To get started, please share your phone number with the button below."
        }
        Prompt::AskName => "Thanks! What should we call you?",
        Prompt::ChooseLanguage => "Which language would you like to chat in?",
        Prompt::MainMenu => "You're all set. Use the menu below whenever you need help.",
        Prompt::AskQuestion => "What would you like to ask? Describe your question in one message.",
        Prompt::WaitingOperator => {
            "Got it. You're in the queue; an operator will join you shortly."
        }
        Prompt::PleaseRepeat => "Sorry, I didn't catch that. Please try again.",
        Prompt::Closed => "This session is now closed. Thank you for reaching out!",
        Prompt::RateRequest => "How would you rate this conversation?",
        Prompt::RateThanks => "Thanks for your feedback!",
    }
}

fn ru(which: Prompt) -> &'static str {
    match which {
        Prompt::SharePhone => {
            "Добро пожаловать! Чтобы начать, поделитесь номером телефона кнопкой ниже."
        }
        Prompt::AskName => "Спасибо! Как к вам обращаться?",
        Prompt::ChooseLanguage => "На каком языке вам удобно общаться?",
        Prompt::MainMenu => "Готово. Меню ниже всегда под рукой, если понадобится помощь.",
        Prompt::AskQuestion => "Что вы хотите спросить? Опишите вопрос одним сообщением.",
        Prompt::WaitingOperator => "Принято. Вы в очереди; оператор скоро подключится.",
        Prompt::PleaseRepeat => "Извините, я не понял. Попробуйте ещё раз.",
        Prompt::Closed => "Сессия завершена. Спасибо за обращение!",
        Prompt::RateRequest => "Как вы оцените эту беседу?",
        Prompt::RateThanks => "Спасибо за отзыв!",
    }
}

/// "An operator joined" notice, with the operator's display name.
pub fn operator_joined(language: &str, name: &str) -> String {
    match language {
        "ru" => format!("Оператор {name} подключился к беседе."),
        _ => format!("Operator {name} has joined the conversation."),
    }
}

/// Sent when a client writes on one channel while their session lives on
/// another. `channel` is the display name of the busy channel.
pub fn already_in_session(language: &str, channel: &str) -> String {
    match language {
        "ru" => format!("У вас уже идёт сессия в {channel}. Продолжите, пожалуйста, там."),
        _ => format!("You already have an open session on {channel}. Please continue there."),
    }
}

/// Close-request question shown under the operator's ask-close message.
pub fn close_question(language: &str) -> &'static str {
    match language {
        "ru" => "Оператор предлагает завершить сессию. Вопрос решён?",
        _ => "The operator suggests closing this session. Is your question resolved?",
    }
}

fn connect_label(language: &str) -> &'static str {
    match language {
        "ru" => "Связаться с оператором",
        _ => "Connect to an operator",
    }
}

fn change_language_label(language: &str) -> &'static str {
    match language {
        "ru" => "Сменить язык",
        _ => "Change language",
    }
}

fn share_contact_label(language: &str) -> &'static str {
    match language {
        "ru" => "Поделиться номером",
        _ => "Share my number",
    }
}

fn yes_label(language: &str) -> &'static str {
    match language {
        "ru" => "Да",
        _ => "Yes",
    }
}

fn no_label(language: &str) -> &'static str {
    match language {
        "ru" => "Нет",
        _ => "No",
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "ru" => "Русский",
        other => other,
    }
}

/// True when the text is the connect-to-operator command or button press.
pub fn is_connect_command(text: &str) -> bool {
    let t = text.trim();
    t == "/operator" || t == connect_label("en") || t == connect_label("ru")
}

/// True when the text is the change-language command or button press.
pub fn is_language_command(text: &str) -> bool {
    let t = text.trim();
    t == "/language" || t == change_language_label("en") || t == change_language_label("ru")
}

/// Inline keyboard listing the configured conversation languages.
pub fn language_keyboard(languages: &[String]) -> Keyboard {
    let rows = languages
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|code| InlineButton {
                    label: language_name(code).to_string(),
                    action: CallbackAction::SetLanguage {
                        language: code.clone(),
                    },
                })
                .collect()
        })
        .collect();
    Keyboard::Inline { rows }
}

/// One row of 1..=5 rating buttons for a closed conversation.
pub fn rate_keyboard(conversation_public_id: &str) -> Keyboard {
    let row = (1..=5u8)
        .map(|score| InlineButton {
            label: score.to_string(),
            action: CallbackAction::Rate {
                score,
                conversation: conversation_public_id.to_string(),
            },
        })
        .collect();
    Keyboard::Inline { rows: vec![row] }
}

/// Yes / No buttons answering an operator's close request.
pub fn close_answer_keyboard(language: &str, message_public_id: &str) -> Keyboard {
    let row = vec![
        InlineButton {
            label: yes_label(language).to_string(),
            action: CallbackAction::CloseAnswer {
                accept: true,
                message: message_public_id.to_string(),
            },
        },
        InlineButton {
            label: no_label(language).to_string(),
            action: CallbackAction::CloseAnswer {
                accept: false,
                message: message_public_id.to_string(),
            },
        },
    ];
    Keyboard::Inline { rows: vec![row] }
}

/// One-time reply keyboard with a share-contact button.
pub fn contact_keyboard(language: &str) -> Keyboard {
    Keyboard::Reply {
        rows: vec![vec![ReplyButton {
            label: share_contact_label(language).to_string(),
            request_contact: true,
        }]],
        one_time: true,
    }
}

/// Persistent reply keyboard shown to an onboarded client.
pub fn main_menu_keyboard(language: &str) -> Keyboard {
    Keyboard::Reply {
        rows: vec![
            vec![ReplyButton {
                label: connect_label(language).to_string(),
                request_contact: false,
            }],
            vec![ReplyButton {
                label: change_language_label(language).to_string(),
                request_contact: false,
            }],
        ],
        one_time: false,
    }
}

/// Localized command menus for channels that support them. The first entry
/// carries `language: None` and serves as the fallback menu.
pub fn command_menu(languages: &[String]) -> Vec<CommandMenu> {
    let commands_for = |lang: &str| {
        vec![
            MenuCommand {
                command: "start".to_string(),
                description: match lang {
                    "ru" => "Начать сначала".to_string(),
                    _ => "Start over".to_string(),
                },
            },
            MenuCommand {
                command: "operator".to_string(),
                description: connect_label(lang).to_string(),
            },
            MenuCommand {
                command: "language".to_string(),
                description: change_language_label(lang).to_string(),
            },
        ]
    };
    let mut menus = vec![CommandMenu {
        language: None,
        commands: commands_for("en"),
    }];
    for code in languages {
        menus.push(CommandMenu {
            language: Some(code.clone()),
            commands: commands_for(code),
        });
    }
    menus
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Prompt; 10] = [
        Prompt::SharePhone,
        Prompt::AskName,
        Prompt::ChooseLanguage,
        Prompt::MainMenu,
        Prompt::AskQuestion,
        Prompt::WaitingOperator,
        Prompt::PleaseRepeat,
        Prompt::Closed,
        Prompt::RateRequest,
        Prompt::RateThanks,
    ];

    #[test]
    fn unknown_language_falls_back_to_english() {
        for which in ALL {
            assert_eq!(prompt("de", which), prompt("en", which));
        }
    }

    #[test]
    fn russian_catalog_covers_every_prompt() {
        for which in ALL {
            assert!(!prompt("ru", which).is_empty());
            assert_ne!(prompt("ru", which), prompt("en", which));
        }
    }

    #[test]
    fn connect_command_matches_slash_and_button_labels() {
        assert!(is_connect_command("/operator"));
        assert!(is_connect_command(" Connect to an operator "));
        assert!(is_connect_command("Связаться с оператором"));
        assert!(!is_connect_command("/start"));
    }

    #[test]
    fn language_keyboard_lists_each_configured_language() {
        let langs = vec!["en".to_string(), "ru".to_string(), "kk".to_string()];
        let Keyboard::Inline { rows } = language_keyboard(&langs) else {
            panic!("expected inline keyboard");
        };
        let buttons: Vec<_> = rows.into_iter().flatten().collect();
        assert_eq!(buttons.len(), 3);
        assert_eq!(buttons[0].label, "English");
        assert_eq!(buttons[1].label, "Русский");
        assert_eq!(buttons[2].label, "kk");
        assert_eq!(
            buttons[2].action,
            CallbackAction::SetLanguage {
                language: "kk".to_string()
            }
        );
    }

    #[test]
    fn rate_keyboard_encodes_scores_one_to_five() {
        let Keyboard::Inline { rows } = rate_keyboard("c-abc") else {
            panic!("expected inline keyboard");
        };
        assert_eq!(rows.len(), 1);
        let encoded: Vec<String> = rows[0].iter().map(|b| b.action.encode()).collect();
        assert_eq!(encoded[0], "rate:1:c-abc");
        assert_eq!(encoded[4], "rate:5:c-abc");
    }

    #[test]
    fn close_answer_buttons_carry_the_message_id() {
        let Keyboard::Inline { rows } = close_answer_keyboard("en", "m-42") else {
            panic!("expected inline keyboard");
        };
        let actions: Vec<String> = rows[0].iter().map(|b| b.action.encode()).collect();
        assert_eq!(actions, vec!["isClose:yes:m-42", "isClose:no:m-42"]);
    }

    #[test]
    fn command_menu_starts_with_the_fallback() {
        let menus = command_menu(&["ru".to_string()]);
        assert_eq!(menus.len(), 2);
        assert!(menus[0].language.is_none());
        assert_eq!(menus[1].language.as_deref(), Some("ru"));
        let commands: Vec<&str> = menus[0].commands.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(commands, vec!["start", "operator", "language"]);
    }
}
