//! Deterministic, non-model-facing messages for the desk.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reply language of canned messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ru,
    En,
    Pt,
}

const PORTUGUESE_MARKERS: &[&str] = &[
    "você", "voce", "não", "sim", "obrigado", "obrigada", "por favor", "está", "também",
    "quando", "olá", "bom dia", "boa tarde",
];

impl Locale {
    /// Guess the language of a message: any Cyrillic means Russian, a few
    /// Portuguese markers mean Portuguese, anything else is English.
    pub fn detect(text: &str) -> Self {
        if text
            .chars()
            .any(|c| matches!(c, '\u{0400}'..='\u{04FF}'))
        {
            return Locale::Ru;
        }
        let tokens = crate::text::tokens(text);
        if crate::text::contains_keyword(&tokens, PORTUGUESE_MARKERS) {
            Locale::Pt
        } else {
            Locale::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::En => "en",
            Locale::Pt => "pt",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replies sent to the person asking.
pub mod user {
    use super::Locale;

    pub fn greeting(locale: Locale) -> &'static str {
        match locale {
            Locale::Ru => {
                "Здравствуйте! Рад помочь вам с вопросами по иммиграции в Португалию. \
                 Задавайте ваши вопросы, постараюсь ответить максимально подробно."
            }
            Locale::En => {
                "Hello! I'm happy to help with your questions about immigrating to Portugal. \
                 Ask away and I'll answer as thoroughly as I can."
            }
            Locale::Pt => {
                "Olá! Terei todo o gosto em ajudar com as suas questões sobre imigração para \
                 Portugal. Pergunte à vontade, vou responder com o máximo de detalhe."
            }
        }
    }

    pub fn closing(locale: Locale) -> &'static str {
        match locale {
            Locale::Ru => "Рад быть полезным! Если возникнут ещё вопросы - обращайтесь.",
            Locale::En => "Glad I could help! If you have more questions, just ask.",
            Locale::Pt => "Fico contente por ajudar! Se tiver mais perguntas, é só dizer.",
        }
    }

    pub fn escalation_notice(locale: Locale) -> &'static str {
        match locale {
            Locale::Ru => {
                "Ваш вопрос требует детального изучения. Я проконсультируюсь с коллегами \
                 и вернусь с точным ответом в ближайшее время."
            }
            Locale::En => {
                "Your question requires detailed analysis. I'll consult with colleagues \
                 and get back to you with a precise answer shortly."
            }
            Locale::Pt => {
                "Sua pergunta requer análise detalhada. Vou consultar colegas e retornarei \
                 com uma resposta precisa em breve."
            }
        }
    }

    pub fn technical_error(locale: Locale) -> &'static str {
        match locale {
            Locale::Ru => {
                "Извините, произошла техническая ошибка. Пожалуйста, повторите вопрос \
                 через несколько минут."
            }
            Locale::En => {
                "Sorry, a technical error occurred. Please ask again in a few minutes."
            }
            Locale::Pt => {
                "Desculpe, ocorreu um erro técnico. Por favor, repita a pergunta dentro de \
                 alguns minutos."
            }
        }
    }
}

/// Texts addressed to operators.
pub mod operator {
    use imigra_db::{PendingTicket, UserProfile};

    pub const NOT_AN_OPERATOR: &str = "Only operators can do this.";
    pub const NO_PENDING_QUESTIONS: &str = "Нет вопросов, ожидающих ответа.";

    /// Notification forwarded to every operator when a question escalates.
    pub fn escalated_question(
        interaction_id: i64,
        user: &UserProfile,
        question: &str,
        confidence: f32,
    ) -> String {
        let username = user
            .username
            .as_deref()
            .map(|name| format!(" (@{})", name))
            .unwrap_or_default();
        format!(
            "❓ Новый вопрос #{id}\n\
             👤 {name}{username}, ID: {external}\n\
             \n\
             {question}\n\
             \n\
             🤖 Уверенность ИИ: {confidence:.0}%\n\
             Ответить: /answer {id} <текст>",
            id = interaction_id,
            name = user.display_name(),
            username = username,
            external = user.external_id,
            question = question,
            confidence = confidence * 100.0,
        )
    }

    /// Listing for the operator `pending` command.
    pub fn pending_list(tickets: &[PendingTicket]) -> String {
        if tickets.is_empty() {
            return NO_PENDING_QUESTIONS.to_string();
        }
        let mut out = format!("Ожидают ответа: {}\n", tickets.len());
        for pending in tickets {
            let confidence = pending
                .confidence_score
                .map(|c| format!("{:.0}%", c * 100.0))
                .unwrap_or_else(|| "n/a".to_string());
            out.push_str(&format!(
                "\n#{} [{}] {}",
                pending.ticket.interaction_id,
                confidence,
                preview(&pending.question_text, 120)
            ));
        }
        out
    }

    fn preview(text: &str, max_chars: usize) -> String {
        let text = text.trim();
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}…", &text[..idx]),
            None => text.to_string(),
        }
    }
}
