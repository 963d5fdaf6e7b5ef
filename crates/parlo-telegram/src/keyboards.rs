// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel-neutral keyboards and command menus, rendered as Telegram
//! reply markup.

use parlo_core::types::{CommandMenu, InlineButton, Keyboard, ReplyButton};
use teloxide::types::{
    BotCommand, ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    KeyboardMarkup, KeyboardRemove, ReplyMarkup,
};

/// Renders a [`Keyboard`] as the matching Telegram reply markup.
pub fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Inline { rows } => ReplyMarkup::InlineKeyboard(inline(rows)),
        Keyboard::Reply { rows, one_time } => ReplyMarkup::Keyboard(reply(rows, *one_time)),
        Keyboard::Remove => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}

fn inline(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.encode()))
            .collect::<Vec<_>>()
    }))
}

fn reply(rows: &[Vec<ReplyButton>], one_time: bool) -> KeyboardMarkup {
    let mut markup = KeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| {
                let button = KeyboardButton::new(b.label.clone());
                if b.request_contact {
                    button.request(ButtonRequest::Contact)
                } else {
                    button
                }
            })
            .collect::<Vec<_>>()
    }));
    markup.resize_keyboard = true;
    markup.one_time_keyboard = one_time;
    markup
}

/// Renders one per-language command menu as Bot API commands.
pub fn commands(menu: &CommandMenu) -> Vec<BotCommand> {
    menu.commands
        .iter()
        .map(|c| BotCommand::new(c.command.clone(), c.description.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use parlo_core::types::{CallbackAction, MenuCommand};
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;

    #[test]
    fn inline_rows_keep_shape_and_encode_actions() {
        let keyboard = Keyboard::Inline {
            rows: vec![
                vec![
                    InlineButton {
                        label: "English".to_string(),
                        action: CallbackAction::SetLanguage {
                            language: "en".to_string(),
                        },
                    },
                    InlineButton {
                        label: "Русский".to_string(),
                        action: CallbackAction::SetLanguage {
                            language: "ru".to_string(),
                        },
                    },
                ],
                vec![InlineButton {
                    label: "5".to_string(),
                    action: CallbackAction::Rate {
                        score: 5,
                        conversation: "c-1".to_string(),
                    },
                }],
            ],
        };
        let ReplyMarkup::InlineKeyboard(markup) = reply_markup(&keyboard) else {
            panic!("expected inline markup");
        };
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][1].text, "Русский");
        assert_eq!(
            markup.inline_keyboard[0][1].kind,
            InlineKeyboardButtonKind::CallbackData("setLang:ru".to_string())
        );
        assert_eq!(
            markup.inline_keyboard[1][0].kind,
            InlineKeyboardButtonKind::CallbackData("rate:5:c-1".to_string())
        );
    }

    #[test]
    fn reply_keyboard_requests_contact() {
        let keyboard = Keyboard::Reply {
            rows: vec![vec![ReplyButton {
                label: "Share my number".to_string(),
                request_contact: true,
            }]],
            one_time: true,
        };
        let ReplyMarkup::Keyboard(markup) = reply_markup(&keyboard) else {
            panic!("expected reply markup");
        };
        assert!(markup.one_time_keyboard);
        assert!(markup.resize_keyboard);
        assert_eq!(
            markup.keyboard[0][0].request,
            Some(ButtonRequest::Contact)
        );
    }

    #[test]
    fn persistent_menu_is_not_one_time() {
        let keyboard = Keyboard::Reply {
            rows: vec![vec![ReplyButton {
                label: "Connect".to_string(),
                request_contact: false,
            }]],
            one_time: false,
        };
        let ReplyMarkup::Keyboard(markup) = reply_markup(&keyboard) else {
            panic!("expected reply markup");
        };
        assert!(!markup.one_time_keyboard);
        assert!(markup.keyboard[0][0].request.is_none());
    }

    #[test]
    fn remove_maps_to_keyboard_remove() {
        assert!(matches!(
            reply_markup(&Keyboard::Remove),
            ReplyMarkup::KeyboardRemove(_)
        ));
    }

    #[test]
    fn commands_map_one_to_one() {
        let menu = CommandMenu {
            language: Some("en".to_string()),
            commands: vec![
                MenuCommand {
                    command: "start".to_string(),
                    description: "Restart the conversation".to_string(),
                },
                MenuCommand {
                    command: "operator".to_string(),
                    description: "Talk to a support operator".to_string(),
                },
            ],
        };
        let rendered = commands(&menu);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].command, "start");
        assert_eq!(rendered[1].description, "Talk to a support operator");
    }
}
