//! Rule execution.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::Transport;
use irods_protocol::api::{keyword, EXEC_MY_RULE_AN};
use irods_protocol::message::{
    ExecCmdOut, ExecMyRuleInp, KeyValPair, MsParam, MsParamArray, RHostAddr, StrPi,
};
use std::collections::BTreeMap;

/// A rule to run on the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rule {
    text: String,
    inputs: Vec<(String, String)>,
    outputs: Vec<String>,
    instance: Option<String>,
}

impl Rule {
    /// A rule with body `text`, e.g. `writeLine('stdout', *x)`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Binds the rule variable `label` (such as `*x`) to `value`.
    pub fn input(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push((label.into(), value.into()));
        self
    }

    /// Asks the server to return `name` after the rule runs.
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Runs the rule on a specific rule engine plugin instance.
    pub fn instance(mut self, name: impl Into<String>) -> Self {
        self.instance = Some(name.into());
        self
    }

    pub fn to_input(&self) -> Result<ExecMyRuleInp, ClientError> {
        if self.text.trim().is_empty() {
            return Err(ClientError::Validation("rule text is empty".into()));
        }

        let mut cond_input = KeyValPair::new();
        if let Some(instance) = &self.instance {
            cond_input.insert(keyword::INSTANCE_NAME, instance.as_str());
        }

        Ok(ExecMyRuleInp {
            my_rule: format!("@external rule {{ {} }}", self.text),
            addr: RHostAddr::default(),
            cond_input,
            out_param_desc: self.outputs.join("%"),
            params: Some(MsParamArray {
                opr_type: 0,
                params: self
                    .inputs
                    .iter()
                    .map(|(label, value)| MsParam::string(label.as_str(), value.as_str()))
                    .collect(),
            }),
        })
    }

    /// Runs the rule and returns its outputs.
    ///
    /// String outputs are keyed by label. Captured rule output appears
    /// under `stdout` and `stderr`. Outputs of other types are skipped.
    pub async fn execute<T: Transport>(
        &self,
        conn: &mut Connection<T>,
    ) -> Result<BTreeMap<String, String>, ClientError> {
        let input = self.to_input()?;
        let params: Option<MsParamArray> = conn.call_optional(EXEC_MY_RULE_AN, &input).await?;
        let params = params.unwrap_or_default();

        let mut results = BTreeMap::new();
        for param in &params.params {
            if let Some(value) = param.payload_as::<StrPi>()? {
                results.insert(param.label.clone(), value.my_str);
            } else if let Some(out) = param.payload_as::<ExecCmdOut>()? {
                results.insert("stdout".to_string(), out.stdout.text());
                results.insert("stderr".to_string(), out.stderr.text());
            } else {
                tracing::debug!("Skipping rule output {} of type {}", param.label, param.type_name);
            }
        }
        Ok(results)
    }
}

/// Lists the rule engine plugin instances configured on the server.
pub async fn rule_engine_instances<T: Transport>(conn: &mut Connection<T>) -> Result<Vec<String>, ClientError> {
    let input = ExecMyRuleInp {
        cond_input: KeyValPair::new().with(keyword::AVAILABLE, ""),
        params: Some(MsParamArray::default()),
        ..Default::default()
    };
    let reply = conn.exchange(EXEC_MY_RULE_AN, &input).await?.into_result()?;

    // The list arrives in the error block, one name per line after a title line.
    let listing = reply
        .error
        .as_ref()
        .and_then(|e| e.first_message())
        .unwrap_or_default();
    Ok(listing
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{api_reply, connected, error_reply, ScriptedTransport};
    use irods_protocol::message::BinBytesBuf;
    use irods_protocol::{ErrorCode, Frame, MsgType};

    #[test]
    fn test_rule_input() {
        let input = Rule::new("*out = *a ++ *b;")
            .input("*a", "x")
            .input("*b", "y")
            .output("*out")
            .output("ruleExecOut")
            .instance("irods_rule_engine_plugin-irods_rule_language-instance")
            .to_input()
            .unwrap();

        assert_eq!(input.my_rule, "@external rule { *out = *a ++ *b; }");
        assert_eq!(input.out_param_desc, "*out%ruleExecOut");
        assert_eq!(
            input.cond_input.get("instance_name"),
            Some("irods_rule_engine_plugin-irods_rule_language-instance")
        );
        let params = input.params.unwrap();
        assert_eq!(params.params.len(), 2);
        assert_eq!(params.params[0].type_name, "STR_PI");
        assert_eq!(
            params.get("*b").unwrap().payload_as::<StrPi>().unwrap().unwrap().my_str,
            "y"
        );
    }

    #[test]
    fn test_empty_rule_rejected() {
        assert!(matches!(Rule::new("  ").to_input(), Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_execute_rule_outputs() {
        let out = MsParamArray {
            opr_type: 0,
            params: vec![
                MsParam::string("*out", "xy"),
                MsParam::new(
                    "ruleExecOut",
                    &ExecCmdOut {
                        stdout: BinBytesBuf::from_text("hello\n"),
                        stderr: BinBytesBuf::default(),
                        status: 0,
                    },
                ),
                MsParam::new("*n", &irods_protocol::message::IntPi { my_int: 3 }),
            ],
        };
        let transport = ScriptedTransport::new().reply(api_reply(0, &out));
        let mut conn = connected(transport).await;

        let results = Rule::new("*out = *a ++ *b; writeLine('stdout', 'hello')")
            .input("*a", "x")
            .input("*b", "y")
            .output("*out")
            .output("ruleExecOut")
            .execute(&mut conn)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results["*out"], "xy");
        assert_eq!(results["stdout"], "hello");
        assert_eq!(results["stderr"], "");

        let requests = conn.transport().api_requests();
        assert_eq!(requests[0].int_info, EXEC_MY_RULE_AN);
    }

    #[tokio::test]
    async fn test_execute_rule_without_output() {
        let transport = ScriptedTransport::new().reply(Frame::new(MsgType::ApiReply));
        let mut conn = connected(transport).await;

        let results = Rule::new("writeLine('serverLog', 'x')")
            .execute(&mut conn)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_rule_engine_instances() {
        let listing = "Level 0: Available rule engine plugin instances:\n\
                       \tirods_rule_engine_plugin-irods_rule_language-instance\n\
                       \tirods_rule_engine_plugin-cpp_default_policy-instance\n";
        let transport = ScriptedTransport::new().reply(error_reply(MsgType::ApiReply, 0, listing));
        let mut conn = connected(transport).await;

        let instances = rule_engine_instances(&mut conn).await.unwrap();
        assert_eq!(
            instances,
            [
                "irods_rule_engine_plugin-irods_rule_language-instance",
                "irods_rule_engine_plugin-cpp_default_policy-instance"
            ]
        );

        let requests = conn.transport().api_requests();
        let sent: ExecMyRuleInp = conn.codec().decode_message(&requests[0].body).unwrap();
        assert_eq!(sent.cond_input.get("available"), Some(""));
        assert_eq!(sent.params, Some(MsParamArray::default()));
    }

    #[tokio::test]
    async fn test_rule_failure() {
        let transport = ScriptedTransport::new().reply(error_reply(
            MsgType::ApiReply,
            ErrorCode::SYS_INTERNAL_ERR.0,
            "rule engine failure",
        ));
        let mut conn = connected(transport).await;

        let err = Rule::new("fail").execute(&mut conn).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SYS_INTERNAL_ERR));
    }
}
