//! Small in-memory dataset shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use lookout_data::dataset::Dataset;
use lookout_data::params::ParameterSet;
use lookout_data::schema::{FieldSpec, FieldType, Schema};
use lookout_data::table::{Cell, Column, FeedTable};
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolKind};

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

pub(crate) fn dataset() -> Arc<Dataset> {
    let columns = vec![
        Column::new("FEED_ID", FieldType::String),
        Column::new("THEATER", FieldType::String),
        Column::new("FRRATE", FieldType::Number),
        Column::new("RES_W", FieldType::Integer),
        Column::new("RES_H", FieldType::Integer),
        Column::new("CODEC", FieldType::String),
        Column::new("ENCR", FieldType::String),
        Column::new("LAT_MS", FieldType::Integer),
        Column::new("MODL_TAG", FieldType::String),
        Column::new("CIV_OK", FieldType::Boolean),
    ];
    let rows = vec![
        vec![
            text("F001"), text("PAC"), Cell::Number(30.0), Cell::Integer(1920),
            Cell::Integer(1080), text("H264"), text("AES256"), Cell::Integer(120),
            text("EO"), Cell::Boolean(true),
        ],
        vec![
            text("F002"), text("EUR"), Cell::Number(29.97), Cell::Integer(1280),
            Cell::Integer(720), text("H265"), text("NONE"), Cell::Null,
            text("IR"), Cell::Boolean(false),
        ],
        vec![
            text("F003"), text("PAC"), Cell::Number(60.0), Cell::Integer(3840),
            Cell::Integer(2160), text("H265"), text("AES128"), Cell::Integer(80),
            text("EO"), Cell::Boolean(true),
        ],
        vec![
            text("F004"), text("ME"), Cell::Number(25.0), Cell::Null,
            Cell::Null, text("H264"), text("AES256"), Cell::Integer(300),
            text("SAR"), Cell::Boolean(false),
        ],
    ];
    let feeds = FeedTable::new(columns, rows, "FEED_ID", None).expect("fixture table");

    let encoder_schema = Schema::new()
        .field("codec", FieldSpec::new(FieldType::String).required())
        .field("bitrate_kbps", FieldSpec::new(FieldType::Integer).minimum(100.0))
        .field("gop", FieldSpec::new(FieldType::Integer));
    let encoder = ParameterSet::validated(
        json!({"codec": "H265", "bitrate_kbps": 8000, "gop": 30}),
        &encoder_schema,
    )
    .expect("fixture encoder params");

    let decoder_schema = Schema::new()
        .field("buffer_ms", FieldSpec::new(FieldType::Integer).required())
        .field("hw_accel", FieldSpec::new(FieldType::Boolean));
    let decoder = ParameterSet::validated(
        json!({"buffer_ms": 200, "hw_accel": true}),
        &decoder_schema,
    )
    .expect("fixture decoder params");

    Arc::new(Dataset::new(feeds, encoder, decoder))
}

/// Stands in for `feeds_search` and panics on every call.
pub(crate) struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FeedsSearch
    }

    fn description(&self) -> String {
        "always panics".to_string()
    }

    fn input_schema(&self) -> Schema {
        Schema::new()
    }

    async fn call(&self, _arguments: Map<String, Value>) -> Result<Value, ToolError> {
        panic!("feed index corrupted")
    }
}
