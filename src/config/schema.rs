use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["accounts"],
        "properties": {
            "accounts": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["account_id", "regions"],
                    "properties": {
                        "account_id": { "type": "string", "minLength": 1 },
                        "role_name": { "type": "string" },
                        "regions": {
                            "type": "array",
                            "minItems": 1,
                            "items": { "type": "string", "minLength": 1 }
                        }
                    }
                }
            },
            "credentials": {
                "type": "object",
                "properties": {
                    "source": { "type": "string", "enum": ["default", "assume-role", "emulated"] },
                    "profile": { "type": "string" },
                    "access_key_id": { "type": "string" },
                    "secret_access_key": { "type": "string" },
                    "session_token": { "type": "string" },
                    "endpoint": { "type": "string" },
                    "session_duration_secs": { "type": "integer", "minimum": 900 },
                    "refresh_margin_secs": { "type": "integer", "minimum": 0 }
                }
            },
            "scan": {
                "type": "object",
                "properties": {
                    "concurrency": { "type": "integer", "minimum": 1 },
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "shutdown_grace_secs": { "type": "integer", "minimum": 0 },
                    "max_attempts": { "type": "integer", "minimum": 1 },
                    "base_delay_ms": { "type": "integer", "minimum": 0 },
                    "max_delay_ms": { "type": "integer", "minimum": 0 },
                    "metric_period_secs": { "type": "integer", "minimum": 60 }
                }
            },
            "scanners": {
                "type": "object",
                "propertyNames": {
                    "enum": ["compute", "database", "block-storage", "load-balancer", "function"]
                },
                "additionalProperties": { "$ref": "#/$defs/kind" }
            },
            "rates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["region", "kind", "size", "monthly_cost"],
                    "properties": {
                        "region": { "type": "string" },
                        "kind": { "type": "string" },
                        "size": { "type": "string" },
                        "monthly_cost": { "type": "number", "minimum": 0 },
                        "unit": { "type": "string", "enum": ["resource", "gb"] }
                    }
                }
            }
        },
        "$defs": {
            "kind": {
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" },
                    "days_to_check": { "type": "integer" },
                    "exclude_tags": {
                        "type": "array",
                        "items": {
                            "oneOf": [
                                { "type": "string" },
                                { "type": "object", "additionalProperties": { "type": "string" } }
                            ]
                        }
                    },
                    "exclude_types": { "type": "array", "items": { "type": "string" } },
                    "include_types": { "type": "array", "items": { "type": "string" } },
                    "minimum_age_days": { "type": "integer", "minimum": 0 },
                    "rules": { "type": "array", "items": { "$ref": "#/$defs/rule" } }
                },
                "additionalProperties": { "type": "number" }
            },
            "rule": {
                "type": "object",
                "required": ["metric_name", "comparison", "limit"],
                "properties": {
                    "name": { "type": "string" },
                    "metric_name": { "type": "string", "minLength": 1 },
                    "comparison": { "type": "string", "enum": ["below", "above"] },
                    "limit": { "type": "number" },
                    "statistic": { "type": "string", "enum": ["average", "sum", "maximum", "minimum"] },
                    "aggregate": { "type": "string", "enum": ["mean", "max", "daily_sum"] },
                    "evaluation_window_days": { "type": "integer", "minimum": 1, "maximum": 90 },
                    "required_sample_coverage": { "type": "number", "minimum": 0, "maximum": 1 },
                    "savings_ratio": { "type": "number", "minimum": 0, "maximum": 1 }
                }
            }
        }
    })
});
