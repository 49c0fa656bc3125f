// Structurer: turns retrieved context plus the user's question into Dish records

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest, ToolCall, ToolSpec};
use crate::models::{Dish, DishList};

pub const SYSTEM_PROMPT: &str = r#"You are Food Surgeon, a cooking assistant. Always answer in Ukrainian.

Guidelines:
- Use only the dishes in the context below; never invent a recipe
- Return one dish for every relevant match, keeping its id exactly as given in the context
- If nothing in the context is relevant, return an empty list of dishes
- Translate the name and type of every dish into Ukrainian
- Always rephrase and enrich the description (steps to prepare); never copy it verbatim
- Put your own opinion of the recipe in "comments""#;

/// Outcome of the structuring step.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredReply {
    /// A structured object was produced. An empty list is a confirmed "nothing relevant".
    Dishes(DishList),
    /// The model answered without a usable object; the raw text is kept for display.
    Unstructured(String),
    /// Every dish the model produced had an id outside the retrieved context.
    Unverified { discarded: usize },
}

impl StructuredReply {
    pub fn empty() -> Self {
        StructuredReply::Dishes(DishList::default())
    }

    /// Metric and log label; an empty list and a missing object stay distinct.
    pub fn outcome(&self) -> &'static str {
        match self {
            StructuredReply::Dishes(list) if list.is_empty() => "confirmed_negative",
            StructuredReply::Dishes(_) => "dishes",
            StructuredReply::Unstructured(text) if text.trim().is_empty() => "no_object",
            StructuredReply::Unstructured(_) => "unstructured",
            StructuredReply::Unverified { .. } => "hallucinated",
        }
    }

    /// Drops dishes whose id is not one of `known_ids`. A non-empty list that
    /// loses every dish becomes `Unverified`.
    pub fn retain_known(self, known_ids: &[&str]) -> Self {
        match self {
            StructuredReply::Dishes(list) => {
                let produced = list.len();
                let dishes: Vec<Dish> = list
                    .dishes
                    .into_iter()
                    .filter(|dish| {
                        let known = known_ids.contains(&dish.id.as_str());
                        if !known {
                            warn!(dish_id = %dish.id, "discarding dish not present in retrieved context");
                        }
                        known
                    })
                    .collect();
                if produced > 0 && dishes.is_empty() {
                    return StructuredReply::Unverified {
                        discarded: produced,
                    };
                }
                StructuredReply::Dishes(DishList { dishes })
            }
            other => other,
        }
    }
}

#[async_trait]
pub trait StructuredResponder: Send + Sync {
    async fn respond(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Result<StructuredReply>;
}

fn prompt_messages(
    system: String,
    query: &str,
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));
    messages
}

fn system_with_context(context: &str) -> String {
    format!("{SYSTEM_PROMPT}\n\n<context>\n{context}\n</context>")
}

pub fn dish_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string", "description": "Identifier of the dish from the retrieved data."},
            "name": {"type": "string", "description": "Name of the dish refined and translated to ukrainian."},
            "type": {"type": "string", "description": "Type of the dish refined and translated to ukrainian."},
            "ingredients": {"type": "string", "description": "Ingredients of the dish from the retrieved data."},
            "description": {"type": "string", "description": "Steps to prepare the dish from the retrieved data. You must always rephrase and enrich it yourself."},
            "comments": {"type": "string", "description": "You must always add your personal thoughts on recipe here."}
        },
        "required": ["id", "name", "type", "ingredients", "description", "comments"]
    })
}

pub fn dish_list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dishes": {"type": "array", "description": "List of dishes.", "items": dish_schema()}
        },
        "required": ["dishes"]
    })
}

/// Native structured output: the model fills `Dish` / `DishList` function calls.
pub struct ToolBindingResponder {
    model: Arc<dyn ChatModel>,
}

impl ToolBindingResponder {
    pub const DISH_TOOL: &'static str = "Dish";
    pub const DISH_LIST_TOOL: &'static str = "DishList";

    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn tools() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: Self::DISH_TOOL.into(),
                description: "Always use this tool to structure your response to the user.".into(),
                parameters: dish_schema(),
            },
            ToolSpec {
                name: Self::DISH_LIST_TOOL.into(),
                description: "Always use this tool to structure your response to the user if you have several dishes as output. Put empty list, if no relevant dish found.".into(),
                parameters: dish_list_schema(),
            },
        ]
    }

    /// Collects dishes from tool calls; `None` when any call is unusable.
    fn parse_calls(calls: &[ToolCall]) -> Option<DishList> {
        let mut dishes = Vec::new();
        for call in calls {
            let parsed = match call.function.name.as_str() {
                Self::DISH_TOOL => serde_json::from_str::<Dish>(&call.function.arguments)
                    .map(|dish| vec![dish]),
                Self::DISH_LIST_TOOL => serde_json::from_str::<DishList>(&call.function.arguments)
                    .map(|list| list.dishes),
                other => {
                    warn!(tool = other, "model called an unknown structuring tool");
                    return None;
                }
            };
            match parsed {
                Ok(found) => dishes.extend(found),
                Err(e) => {
                    warn!(tool = %call.function.name, error = %e, "tool arguments failed validation");
                    return None;
                }
            }
        }
        Some(DishList { dishes })
    }
}

#[async_trait]
impl StructuredResponder for ToolBindingResponder {
    async fn respond(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Result<StructuredReply> {
        let request = CompletionRequest::new(prompt_messages(
            system_with_context(context),
            query,
            history,
        ))
        .with_tools(Self::tools());

        let reply = self.model.complete(request).await?;
        if reply.tool_calls.is_empty() {
            info!("Structurer: model answered without calling a tool");
            return Ok(StructuredReply::Unstructured(reply.text_content().to_string()));
        }

        Ok(match Self::parse_calls(&reply.tool_calls) {
            Some(list) => StructuredReply::Dishes(list),
            None => {
                let raw = reply
                    .content
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| {
                        reply
                            .tool_calls
                            .iter()
                            .map(|c| c.function.arguments.as_str())
                            .collect::<Vec<_>>()
                            .join("\n")
                    });
                StructuredReply::Unstructured(raw)
            }
        })
    }
}

/// Text generation with JSON format instructions, parsed locally.
pub struct ExtractionResponder {
    model: Arc<dyn ChatModel>,
}

impl ExtractionResponder {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

pub fn format_instructions() -> String {
    format!(
        "Wrap the output in `json` tags and return a JSON object that matches this schema, with no other text:\n```json\n{}\n```",
        dish_list_schema()
    )
}

#[async_trait]
impl StructuredResponder for ExtractionResponder {
    async fn respond(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Result<StructuredReply> {
        let system = format!("{}\n\n{}", system_with_context(context), format_instructions());
        let request = CompletionRequest::new(prompt_messages(system, query, history));

        let reply = self.model.complete(request).await?;
        Ok(parse_structured_text(reply.text_content()))
    }
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid object pattern"))
}

/// The outermost brace-delimited span of `text`: first `{` through last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    object_pattern().find(text).map(|m| m.as_str())
}

/// Extraction fallback: finds the embedded object and validates it as a `DishList`
/// (a single `Dish` object counts as a one-element list).
pub fn parse_structured_text(text: &str) -> StructuredReply {
    let Some(candidate) = extract_json_object(text) else {
        return StructuredReply::Unstructured(text.to_string());
    };

    if let Ok(list) = serde_json::from_str::<DishList>(candidate) {
        return StructuredReply::Dishes(list);
    }
    if let Ok(dish) = serde_json::from_str::<Dish>(candidate) {
        return StructuredReply::Dishes(DishList { dishes: vec![dish] });
    }
    warn!("Structurer: embedded object did not match the dish schema");
    StructuredReply::Unstructured(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tool_call_reply, FakeChatModel};

    fn mlyntsi() -> Dish {
        Dish {
            id: "mlyntsi".into(),
            name: "Млинці".into(),
            kind: "Сніданок".into(),
            ingredients: "борошно, молоко, яйця".into(),
            description: "Збийте яйця з молоком, додайте борошно і смажте тонкі млинці.".into(),
            comments: "Найкраще зі сметаною та медом.".into(),
        }
    }

    #[test]
    fn test_extraction_roundtrip_through_free_text() {
        let list = DishList {
            dishes: vec![mlyntsi(), Dish { id: "syrnyky".into(), ..mlyntsi() }],
        };
        let text = format!(
            "Ось що я знайшов:\n```json\n{}\n```\nСмачного!",
            serde_json::to_string_pretty(&list).unwrap()
        );

        assert_eq!(parse_structured_text(&text), StructuredReply::Dishes(list));
    }

    #[test]
    fn test_extraction_empty_list_is_confirmed_negative() {
        let reply = parse_structured_text("На жаль, нічого немає. {\"dishes\": []}");
        assert_eq!(reply, StructuredReply::empty());
        assert_eq!(reply.outcome(), "confirmed_negative");
    }

    #[test]
    fn test_extraction_without_object_is_unstructured() {
        let reply = parse_structured_text("Вибач, я не знаю такої страви.");
        assert_eq!(
            reply,
            StructuredReply::Unstructured("Вибач, я не знаю такої страви.".into())
        );
        assert_eq!(reply.outcome(), "unstructured");
    }

    #[test]
    fn test_extraction_invalid_object_is_unstructured() {
        let text = "{\"dishes\": [{\"id\": \"x\"}]}";
        assert_eq!(
            parse_structured_text(text),
            StructuredReply::Unstructured(text.into())
        );
    }

    #[test]
    fn test_extraction_accepts_single_dish() {
        let text = serde_json::to_string(&mlyntsi()).unwrap();
        assert_eq!(
            parse_structured_text(&text),
            StructuredReply::Dishes(DishList { dishes: vec![mlyntsi()] })
        );
    }

    #[test]
    fn test_extract_json_object_spans_nested_braces() {
        assert_eq!(
            extract_json_object("a {\"x\": {\"y\": 1}} b"),
            Some("{\"x\": {\"y\": 1}}")
        );
        assert_eq!(extract_json_object("no braces"), None);
    }

    #[test]
    fn test_retain_known_drops_unknown_ids() {
        let reply = StructuredReply::Dishes(DishList {
            dishes: vec![mlyntsi(), Dish { id: "invented".into(), ..mlyntsi() }],
        });
        let kept = reply.retain_known(&["mlyntsi", "borshch"]);
        assert_eq!(kept, StructuredReply::Dishes(DishList { dishes: vec![mlyntsi()] }));
    }

    #[test]
    fn test_retain_known_all_unknown_is_hallucinated() {
        let reply = StructuredReply::Dishes(DishList {
            dishes: vec![Dish { id: "invented".into(), ..mlyntsi() }],
        });

        let kept = reply.retain_known(&["mlyntsi"]);

        assert_eq!(kept, StructuredReply::Unverified { discarded: 1 });
        assert_eq!(kept.outcome(), "hallucinated");
        assert_eq!(
            StructuredReply::empty().retain_known(&["mlyntsi"]).outcome(),
            "confirmed_negative"
        );
    }

    #[tokio::test]
    async fn test_tool_binding_collects_dish_calls() {
        let syrnyky = Dish { id: "syrnyky".into(), ..mlyntsi() };
        let reply = ChatMessage {
            tool_calls: vec![
                ToolCall::new("c1", "Dish", serde_json::to_string(&mlyntsi()).unwrap()),
                ToolCall::new("c2", "DishList", json!({ "dishes": [syrnyky] }).to_string()),
            ],
            ..ChatMessage::assistant("")
        };
        let model = Arc::new(FakeChatModel::scripted(vec![reply]));
        let responder = ToolBindingResponder::new(model.clone());

        let result = responder
            .respond("млинці", "id: mlyntsi\nname: Млинці", &[])
            .await
            .unwrap();

        let StructuredReply::Dishes(list) = result else {
            panic!("expected dishes");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list.dishes[1].id, "syrnyky");

        let request = &model.requests()[0];
        assert_eq!(request.tools.len(), 2);
        assert!(request.messages[0]
            .text_content()
            .contains("<context>\nid: mlyntsi\nname: Млинці\n</context>"));
        assert_eq!(request.messages.last().unwrap().text_content(), "млинці");
    }

    #[tokio::test]
    async fn test_tool_binding_plain_text_is_unstructured() {
        let model = Arc::new(FakeChatModel::scripted(vec![ChatMessage::assistant(
            "Спробуй пошукати вареники.",
        )]));
        let responder = ToolBindingResponder::new(model);

        let result = responder.respond("що поїсти?", "id: a\nx", &[]).await.unwrap();
        assert_eq!(
            result,
            StructuredReply::Unstructured("Спробуй пошукати вареники.".into())
        );
    }

    #[tokio::test]
    async fn test_tool_binding_bad_arguments_are_unstructured() {
        let model = Arc::new(FakeChatModel::scripted(vec![tool_call_reply(
            "Dish",
            json!({"id": "mlyntsi"}),
        )]));
        let responder = ToolBindingResponder::new(model);

        let result = responder.respond("млинці", "id: mlyntsi\nx", &[]).await.unwrap();
        assert!(matches!(result, StructuredReply::Unstructured(raw) if raw.contains("mlyntsi")));
    }

    #[tokio::test]
    async fn test_extraction_responder_sends_format_instructions() {
        let model = Arc::new(FakeChatModel::scripted(vec![ChatMessage::assistant(
            "```json\n{\"dishes\": []}\n```",
        )]));
        let responder = ExtractionResponder::new(model.clone());
        let history = vec![ChatMessage::user("привіт"), ChatMessage::assistant("привіт!")];

        let result = responder.respond("пельмені", "id: a\nx", &history).await.unwrap();

        assert_eq!(result, StructuredReply::empty());
        let request = &model.requests()[0];
        assert!(request.tools.is_empty());
        assert!(request.messages[0].text_content().contains("\"dishes\""));
        assert_eq!(request.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let responder = ToolBindingResponder::new(Arc::new(FakeChatModel::failing("401")));
        assert!(responder.respond("борщ", "id: a\nx", &[]).await.is_err());
    }
}
