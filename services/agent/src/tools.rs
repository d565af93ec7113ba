//! Device Tools
//!
//! The capabilities this device exposes to the remote agent. Each tool is
//! declared and registered in one place, so whatever is registered is also
//! what the handshake advertises.

use crate::{
    hand::{HandActuator, MAX_FINGERS},
    page::PageSurface,
};
use anyhow::bail;
use rtc_agent_core::{
    RegistryError, ToolDefinition, ToolRegistry,
    registry::{ToolOutput, handler_fn, typed},
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ColorArgs {
    /// A hex value of the color
    pub color: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FingersArgs {
    /// How many fingers to hold up
    #[serde(rename = "numberOfFingers")]
    #[schemars(range(min = 0, max = 5))]
    pub number_of_fingers: u8,
}

fn output(value: serde_json::Value) -> ToolOutput {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ToolOutput::new(),
    }
}

/// Builds the registry for this device. `showFingers` is only offered when a
/// hand is attached.
pub fn build_registry(
    page: Arc<PageSurface>,
    hand: Option<Arc<dyn HandActuator>>,
) -> Result<ToolRegistry, RegistryError> {
    let background_page = page.clone();
    let text_page = page.clone();
    let html_page = page;

    let mut builder = ToolRegistry::builder()
        .register(
            ToolDefinition::new(
                "changeBackgroundColor",
                "Changes the background color of a web page",
            )
            .with_parameters_for::<ColorArgs>(),
            typed(move |args: ColorArgs| {
                let page = background_page.clone();
                async move {
                    page.set_background_color(&args.color).await?;
                    Ok::<_, anyhow::Error>(output(json!({"success": true, "color": args.color})))
                }
            }),
        )?
        .register(
            ToolDefinition::new("changeTextColor", "Changes the text color of a web page")
                .with_parameters_for::<ColorArgs>(),
            typed(move |args: ColorArgs| {
                let page = text_page.clone();
                async move {
                    page.set_text_color(&args.color).await?;
                    Ok::<_, anyhow::Error>(output(json!({"success": true, "color": args.color})))
                }
            }),
        )?
        .register(
            ToolDefinition::new("getPageHTML", "Gets the HTML for the current page"),
            handler_fn(move |_| {
                let page = html_page.clone();
                async move {
                    let html = page.outer_html().await;
                    Ok::<_, anyhow::Error>(output(json!({"success": true, "html": html})))
                }
            }),
        )?;

    if let Some(hand) = hand {
        builder = builder.register(
            ToolDefinition::new(
                "showFingers",
                "Holds up a number of fingers on the robotic hand",
            )
            .with_parameters_for::<FingersArgs>(),
            typed(move |args: FingersArgs| {
                let hand = hand.clone();
                async move {
                    if args.number_of_fingers > MAX_FINGERS {
                        bail!(
                            "a hand has at most {} fingers, got {}",
                            MAX_FINGERS,
                            args.number_of_fingers
                        );
                    }
                    hand.show_fingers(args.number_of_fingers).await?;
                    Ok::<_, anyhow::Error>(output(
                        json!({"success": true, "numberOfFingers": args.number_of_fingers}),
                    ))
                }
            }),
        )?;
    }

    Ok(builder.build())
}
