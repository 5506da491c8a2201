//! Builds provider payloads from a [`RequestContext`]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use relay_config::GenerationConfig;

use crate::context::RequestContext;
use crate::error::AssembleError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest, AnthropicTool,
    AnthropicToolChoice,
};
use crate::protocol::google::{
    GoogleContent, GoogleFunctionCallingConfig, GoogleFunctionDeclaration, GoogleGenerationConfig, GooglePart,
    GoogleRequest, GoogleTool, GoogleToolConfig,
};
use crate::types::{ImageInput, InlineImage, Role, ToolSet};

/// Text sent by health probes
const PROBE_TEXT: &str = "ping";

/// Builds wire payloads with the configured generation parameters
#[derive(Debug, Clone, Default)]
pub struct RequestAssembler {
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
}

impl RequestAssembler {
    pub const fn new(temperature: Option<f64>, max_output_tokens: Option<u32>) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }

    pub const fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.temperature, config.max_output_tokens)
    }

    /// Decode caller images, dropping any that are not valid images
    pub fn decode_images(images: &[ImageInput]) -> Vec<InlineImage> {
        images
            .iter()
            .enumerate()
            .filter_map(|(index, image)| match decode_image(image) {
                Ok(decoded) => Some(decoded),
                Err(reason) => {
                    tracing::warn!(index, reason, "dropping image attachment");
                    None
                }
            })
            .collect()
    }

    /// Reject requests that have nothing to send
    ///
    /// # Errors
    ///
    /// Returns `AssembleError::MissingMessage` when the message is blank and
    /// no images were supplied
    pub fn validate(ctx: &RequestContext) -> Result<(), AssembleError> {
        if ctx.message.trim().is_empty() && !ctx.images_supplied() {
            return Err(AssembleError::MissingMessage);
        }
        Ok(())
    }

    /// Build a `generateContent` request
    ///
    /// # Errors
    ///
    /// Returns `AssembleError::MissingMessage` when there is nothing to send
    pub fn assemble(&self, ctx: &RequestContext) -> Result<GoogleRequest, AssembleError> {
        Self::validate(ctx)?;

        let mut system = Vec::new();
        let mut contents = Vec::with_capacity(ctx.history.len() + 1);

        for turn in &ctx.history {
            match turn.role {
                Role::System => system.push(GooglePart::text(&turn.content)),
                Role::User => contents.push(GoogleContent::new("user", vec![GooglePart::text(&turn.content)])),
                Role::Assistant => contents.push(GoogleContent::new("model", vec![GooglePart::text(&turn.content)])),
            }
        }

        let mut parts = Vec::with_capacity(ctx.images.len() + 1);
        if !ctx.message.trim().is_empty() {
            parts.push(GooglePart::text(&ctx.message));
        }
        parts.extend(
            ctx.images
                .iter()
                .map(|image| GooglePart::inline(&image.mime_type, &image.data)),
        );
        // Every supplied image was dropped; the backend still needs a part
        if parts.is_empty() {
            parts.push(GooglePart::text(&ctx.message));
        }
        contents.push(GoogleContent::new("user", parts));

        let (tools, tool_config) = ctx.tools.as_deref().map_or_else(|| (Vec::new(), None), google_tools);

        Ok(GoogleRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| GoogleContent { role: None, parts: system }),
            generation_config: self.google_generation_config(self.max_output_tokens),
            tools,
            tool_config,
        })
    }

    /// Build an Anthropic Messages request for the secondary provider
    ///
    /// # Errors
    ///
    /// Returns `AssembleError::MissingMessage` when there is nothing to send
    pub fn assemble_secondary(
        &self,
        ctx: &RequestContext,
        model: &str,
        max_tokens: u32,
    ) -> Result<AnthropicRequest, AssembleError> {
        Self::validate(ctx)?;

        let mut system = Vec::new();
        let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(ctx.history.len() + 1);

        for turn in &ctx.history {
            let role = match turn.role {
                Role::System => {
                    system.push(turn.content.as_str());
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            push_anthropic_text(&mut messages, role, &turn.content);
        }

        let mut blocks: Vec<AnthropicContentBlock> = ctx
            .images
            .iter()
            .map(|image| AnthropicContentBlock::Image {
                source: AnthropicImageSource {
                    source_type: "base64".to_owned(),
                    media_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            })
            .collect();
        if !ctx.message.trim().is_empty() || blocks.is_empty() {
            blocks.push(AnthropicContentBlock::Text {
                text: ctx.message.clone(),
            });
        }
        match messages.last_mut() {
            Some(last) if last.role == "user" => last.content.append(&mut blocks),
            _ => messages.push(AnthropicMessage {
                role: "user".to_owned(),
                content: blocks,
            }),
        }

        // The Messages API requires the first message to come from the user
        if messages.first().is_some_and(|m| m.role != "user") {
            messages.insert(
                0,
                AnthropicMessage {
                    role: "user".to_owned(),
                    content: vec![AnthropicContentBlock::Text {
                        text: "(conversation resumed)".to_owned(),
                    }],
                },
            );
        }

        let (tools, tool_choice) = ctx.tools.as_deref().map_or_else(|| (Vec::new(), None), anthropic_tools);

        Ok(AnthropicRequest {
            model: model.to_owned(),
            max_tokens: self.max_output_tokens.map_or(max_tokens, |m| m.min(max_tokens)),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            temperature: self.temperature,
            tools,
            tool_choice,
        })
    }

    /// Minimal one-token generation used by health checks
    pub fn probe(&self) -> GoogleRequest {
        GoogleRequest {
            contents: vec![GoogleContent::new("user", vec![GooglePart::text(PROBE_TEXT)])],
            generation_config: self.google_generation_config(Some(1)),
            ..GoogleRequest::default()
        }
    }

    /// Minimal one-token Messages request used by health checks
    pub fn secondary_probe(model: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: model.to_owned(),
            max_tokens: 1,
            system: None,
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: vec![AnthropicContentBlock::Text {
                    text: PROBE_TEXT.to_owned(),
                }],
            }],
            temperature: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    fn google_generation_config(&self, max_output_tokens: Option<u32>) -> Option<GoogleGenerationConfig> {
        if self.temperature.is_none() && max_output_tokens.is_none() {
            return None;
        }

        Some(GoogleGenerationConfig {
            temperature: self.temperature,
            max_output_tokens,
        })
    }
}

fn google_tools(tools: &ToolSet) -> (Vec<GoogleTool>, Option<GoogleToolConfig>) {
    let declarations = tools
        .declarations()
        .iter()
        .map(|tool| GoogleFunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect();

    (
        vec![GoogleTool {
            function_declarations: declarations,
        }],
        Some(GoogleToolConfig {
            function_calling_config: GoogleFunctionCallingConfig {
                mode: "AUTO".to_owned(),
            },
        }),
    )
}

fn anthropic_tools(tools: &ToolSet) -> (Vec<AnthropicTool>, Option<AnthropicToolChoice>) {
    let tools = tools
        .declarations()
        .iter()
        .map(|tool| AnthropicTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} })),
        })
        .collect();

    (
        tools,
        Some(AnthropicToolChoice {
            choice_type: "auto".to_owned(),
        }),
    )
}

/// Append text, merging into the previous message when roles repeat
fn push_anthropic_text(messages: &mut Vec<AnthropicMessage>, role: &str, text: &str) {
    let block = AnthropicContentBlock::Text { text: text.to_owned() };

    match messages.last_mut() {
        Some(last) if last.role == role => last.content.push(block),
        _ => messages.push(AnthropicMessage {
            role: role.to_owned(),
            content: vec![block],
        }),
    }
}

fn decode_image(image: &ImageInput) -> Result<InlineImage, &'static str> {
    let (payload, declared) = match image {
        ImageInput::DataUri(uri) => {
            let rest = uri.strip_prefix("data:").ok_or("not a data uri")?;
            let (meta, payload) = rest.split_once(',').ok_or("data uri has no payload")?;
            let mime = meta.strip_suffix(";base64").ok_or("data uri is not base64 encoded")?;
            (payload, (!mime.is_empty()).then_some(mime))
        }
        ImageInput::Base64 { data, mime_type } => (data.as_str(), mime_type.as_deref()),
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|_| "invalid base64")?;
    let format = image::guess_format(&bytes).map_err(|_| "unrecognized image format")?;
    let mime_type = format.to_mime_type();

    if let Some(declared) = declared
        && !declared.eq_ignore_ascii_case(mime_type)
    {
        tracing::debug!(declared, sniffed = mime_type, "image mime type differs from its content");
    }

    Ok(InlineImage {
        mime_type: mime_type.to_owned(),
        data: STANDARD.encode(&bytes),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::tier::ServiceTier;
    use crate::types::{ChatTurn, ToolDeclaration};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn png_base64() -> String {
        STANDARD.encode(PNG_MAGIC)
    }

    fn ctx(message: &str) -> RequestContext {
        RequestContext::new(message, ServiceTier::Flash, 2)
    }

    fn tool_set() -> Arc<ToolSet> {
        Arc::new(ToolSet::new(vec![ToolDeclaration {
            name: "search_catalog".to_owned(),
            description: Some("Search the catalog".to_owned()),
            parameters: Some(json!({ "type": "object", "properties": { "q": { "type": "string" } } })),
        }]))
    }

    #[test]
    fn text_with_history_maps_roles() {
        let ctx = ctx("next question").with_history(vec![
            ChatTurn::new(Role::System, "be brief"),
            ChatTurn::user("hello"),
            ChatTurn::assistant("hi there"),
        ]);

        let request = RequestAssembler::default().assemble(&ctx).unwrap();

        let roles: Vec<_> = request.contents.iter().map(|c| c.role.as_deref().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
        assert_eq!(
            request.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("be brief")
        );
        assert!(request.tools.is_empty());
        assert!(request.generation_config.is_none());
    }

    #[test]
    fn generation_params_are_attached() {
        let request = RequestAssembler::new(Some(0.3), Some(512)).assemble(&ctx("hi")).unwrap();

        let config = request.generation_config.unwrap();
        assert_eq!(config.temperature, Some(0.3));
        assert_eq!(config.max_output_tokens, Some(512));
    }

    #[test]
    fn blank_message_without_images_is_rejected() {
        let err = RequestAssembler::default().assemble(&ctx("   ")).unwrap_err();
        assert_eq!(err, AssembleError::MissingMessage);
    }

    #[test]
    fn image_only_request_is_allowed() {
        let images = RequestAssembler::decode_images(&[ImageInput::Base64 {
            data: png_base64(),
            mime_type: None,
        }]);
        let ctx = ctx("").with_images(images, 1);

        let request = RequestAssembler::default().assemble(&ctx).unwrap();

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].inline_data.as_ref().unwrap().mime_type, "image/png");
    }

    #[test]
    fn images_are_sniffed_and_attached_after_text() {
        let jpeg_uri = format!("data:image/png;base64,{}", STANDARD.encode(JPEG_MAGIC));
        let images = RequestAssembler::decode_images(&[
            ImageInput::parse(jpeg_uri),
            ImageInput::parse(png_base64()),
        ]);

        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[1].mime_type, "image/png");

        let request = RequestAssembler::default()
            .assemble(&ctx("describe these").with_images(images, 2))
            .unwrap();

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].text.as_deref(), Some("describe these"));
        assert!(parts[1].inline_data.is_some());
        assert!(parts[2].inline_data.is_some());
    }

    #[test]
    fn invalid_images_are_dropped() {
        let images = RequestAssembler::decode_images(&[
            ImageInput::parse("data:image/png;base64,!!!not-base64!!!"),
            ImageInput::parse(STANDARD.encode(b"plain text, not an image")),
            ImageInput::parse("data:text/plain,hello"),
            ImageInput::parse(png_base64()),
        ]);

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
    }

    #[test]
    fn all_images_dropped_still_sends_text() {
        let images = RequestAssembler::decode_images(&[ImageInput::parse("data:image/png;base64,@@@")]);
        let ctx = ctx("what is this").with_images(images, 1);

        let request = RequestAssembler::default().assemble(&ctx).unwrap();

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text.as_deref(), Some("what is this"));
    }

    #[test]
    fn tools_attach_auto_mode() {
        let ctx = ctx("find shoes").with_tools(Some(tool_set()));

        let request = RequestAssembler::default().assemble(&ctx).unwrap();

        assert_eq!(request.tools[0].function_declarations[0].name, "search_catalog");
        assert_eq!(request.tool_config.unwrap().function_calling_config.mode, "AUTO");
    }

    #[test]
    fn empty_tool_set_is_not_attached() {
        let ctx = ctx("find shoes").with_tools(Some(Arc::new(ToolSet::default())));

        let request = RequestAssembler::default().assemble(&ctx).unwrap();

        assert!(request.tools.is_empty());
        assert!(request.tool_config.is_none());
    }

    #[test]
    fn secondary_payload_mirrors_context() {
        let images = RequestAssembler::decode_images(&[ImageInput::parse(png_base64())]);
        let ctx = ctx("and now?")
            .with_history(vec![
                ChatTurn::new(Role::System, "be brief"),
                ChatTurn::assistant("welcome back"),
                ChatTurn::user("hi"),
            ])
            .with_images(images, 1)
            .with_tools(Some(tool_set()));

        let request = RequestAssembler::new(Some(0.5), Some(256))
            .assemble_secondary(&ctx, "claude-sonnet-4", 4096)
            .unwrap();

        assert_eq!(request.model, "claude-sonnet-4");
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.system.as_deref(), Some("be brief"));
        let roles: Vec<_> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        let last = request.messages.last().unwrap();
        assert!(matches!(&last.content[0], AnthropicContentBlock::Text { text } if text == "hi"));
        assert!(matches!(last.content[1], AnthropicContentBlock::Image { .. }));
        assert!(matches!(&last.content[2], AnthropicContentBlock::Text { text } if text == "and now?"));
        assert_eq!(request.tools[0].name, "search_catalog");
        assert_eq!(request.tool_choice.unwrap().choice_type, "auto");
    }

    #[test]
    fn consecutive_user_turns_are_merged_for_secondary() {
        let ctx = ctx("third").with_history(vec![ChatTurn::user("first"), ChatTurn::user("second")]);

        let request = RequestAssembler::default()
            .assemble_secondary(&ctx, "claude", 1024)
            .unwrap();

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content.len(), 3);
    }

    #[test]
    fn probes_request_one_token() {
        let probe = RequestAssembler::new(Some(0.9), Some(2048)).probe();
        assert_eq!(probe.generation_config.unwrap().max_output_tokens, Some(1));

        let secondary = RequestAssembler::secondary_probe("claude");
        assert_eq!(secondary.max_tokens, 1);
    }
}
