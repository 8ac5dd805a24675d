//! End-to-end turn-loop tests against fake collaborators.

mod common;

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use xdialogue::{Agent, TurnRequest};

fn agent_with(configs: &[xdialogue::GraphConfig], collab: xdialogue::Collaborators) -> Agent {
    let agent = Agent::new("robot-1", collab, Duration::from_secs(600));
    let report = agent.load_graphs(configs);
    assert!(report.failed.is_empty(), "fixture graphs must compile");
    agent
}

#[tokio::test]
async fn round_trip_move_car() {
    let interp = FakeInterpreter::new()
        .intent("帮我挪一下车", "move_car", 0.9)
        .ability("粤A23456", "plate", "粤A23456");
    let agent = agent_with(&[move_car_graph()], basic_collaborators(interp));

    // Turn 1: the flow triggers but no plate is extracted → re-ask.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "帮我挪一下车"))
        .await
        .unwrap();
    assert_eq!(pack.says, "请问您的车牌号是多少？");
    let dialog = pack.dialog.unwrap();
    assert!(dialog.is_start);
    assert!(!dialog.is_end);
    assert_eq!(dialog.graph_id, "g_move_car");
    assert_eq!(dialog.node_id, "n_fill");

    // Turn 2: plate extracted → slot filled, flow reaches the terminal say.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "粤A23456"))
        .await
        .unwrap();
    assert_eq!(pack.says, "已通知车主挪车，车牌粤A23456");
    let dialog = pack.dialog.unwrap();
    assert!(dialog.is_end);
    assert_eq!(dialog.node_id, "n_done");
    assert_eq!(pack.dialog_status, "20");
    let slot = pack
        .slots
        .iter()
        .find(|s| s.key == "plate_number")
        .expect("plate slot touched this turn");
    assert_eq!(slot.value, "粤A23456");
    assert_eq!(slot.name, "车牌号");
}

#[tokio::test]
async fn reask_does_not_advance_cursor() {
    let interp = FakeInterpreter::new().intent("帮我挪一下车", "move_car", 0.9);
    let agent = agent_with(&[move_car_graph()], basic_collaborators(interp));

    agent
        .handle_message(TurnRequest::new("s1", "帮我挪一下车"))
        .await
        .unwrap();
    // Two more turns with no plate: the same slot keeps re-asking.
    for _ in 0..2 {
        let pack = agent
            .handle_message(TurnRequest::new("s1", "你好"))
            .await
            .unwrap();
        assert_eq!(pack.says, "请问您的车牌号是多少？");
        assert_eq!(pack.dialog.unwrap().node_id, "n_fill");
        assert_eq!(pack.understanding, "2");
    }
}

fn judge_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_vip",
        "name": "会员判断",
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "check_vip"}]]
            },
            {
                "node_id": "n_judge",
                "node_type": "judge",
                "branches": [
                    {
                        "branch_id": "b1",
                        "branch_name": "有会员参数",
                        "conditions": [[{"type": "params", "name": "vip", "operator": "notNull", "value": null}]]
                    },
                    {
                        "branch_id": "b2",
                        "branch_name": "会员等级一",
                        "conditions": [[{"type": "params", "name": "vip", "operator": "==", "value": "1"}]]
                    }
                ]
            },
            {"node_id": "n_b1", "node_type": "say", "content": ["走了第一分支"]},
            {"node_id": "n_b2", "node_type": "say", "content": ["走了第二分支"]},
            {"node_id": "n_default", "node_type": "say", "content": ["走了默认分支"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_judge"},
            {"line_id": "l2", "source_id": "n_judge", "target_id": "n_b1", "branch_id": "b1"},
            {"line_id": "l3", "source_id": "n_judge", "target_id": "n_b2", "branch_id": "b2"},
            {"line_id": "l4", "source_id": "n_judge", "target_id": "n_default"}
        ]
    }))
}

#[tokio::test]
async fn judge_picks_first_satisfied_branch_over_default() {
    let interp = FakeInterpreter::new().intent("查会员", "check_vip", 0.9);
    let agent = agent_with(&[judge_graph()], basic_collaborators(interp));

    // Both b1 and b2 are satisfiable; declared order wins, and the default
    // child is never considered.
    let mut request = TurnRequest::new("s1", "查会员");
    request.params = Some(HashMap::from([("vip".to_string(), json!("1"))]));
    let pack = agent.handle_message(request).await.unwrap();
    assert_eq!(pack.says, "走了第一分支");
}

#[tokio::test]
async fn judge_falls_back_to_default_child() {
    let interp = FakeInterpreter::new().intent("查会员", "check_vip", 0.9);
    let agent = agent_with(&[judge_graph()], basic_collaborators(interp));

    let pack = agent
        .handle_message(TurnRequest::new("s1", "查会员"))
        .await
        .unwrap();
    assert_eq!(pack.says, "走了默认分支");
}

fn city_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_city",
        "name": "选择城市",
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "book_city"}]]
            },
            {
                "node_id": "n_ask",
                "node_type": "say",
                "content": ["请选择您所在的城市"],
                "options": ["广州", "深圳"]
            },
            {"node_id": "n_gz", "node_type": "say", "content": ["已选择广州"]},
            {"node_id": "n_sz", "node_type": "say", "content": ["已选择深圳"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_ask"},
            {"line_id": "l2", "source_id": "n_ask", "target_id": "n_gz", "option_id": "广州"},
            {"line_id": "l3", "source_id": "n_ask", "target_id": "n_sz", "option_id": "深圳"}
        ]
    }))
}

#[tokio::test]
async fn option_fuzzy_match_accepts_ratio_below_half() {
    let interp = FakeInterpreter::new().intent("订酒店", "book_city", 0.9);
    let agent = agent_with(&[city_graph()], basic_collaborators(interp));

    let pack = agent
        .handle_message(TurnRequest::new("s1", "订酒店"))
        .await
        .unwrap();
    assert_eq!(pack.says, "请选择您所在的城市");
    assert_eq!(pack.options, vec!["广州", "深圳"]);

    // Edit distance 1 over 3 chars is ~0.33: accepted as 广州.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "广州市"))
        .await
        .unwrap();
    assert_eq!(pack.says, "已选择广州");
}

#[tokio::test]
async fn option_fuzzy_match_rejects_ratio_of_half() {
    let interp = FakeInterpreter::new().intent("订酒店", "book_city", 0.9);
    let agent = agent_with(&[city_graph()], basic_collaborators(interp));

    agent
        .handle_message(TurnRequest::new("s1", "订酒店"))
        .await
        .unwrap();
    // Edit distance 1 over 2 chars is exactly 0.5: rejected, so the turn
    // falls through to chit-chat with the options re-presented.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "广洲"))
        .await
        .unwrap();
    assert_eq!(pack.reply_type, "1");
    assert!(pack.says.starts_with("我们聊点别的吧"));
    assert_eq!(pack.options, vec!["广州", "深圳"]);
}

#[tokio::test]
async fn exhausted_options_let_the_user_pivot_to_another_graph() {
    let interp = FakeInterpreter::new()
        .intent("订酒店", "book_city", 0.9)
        .intent("帮我挪一下车", "move_car", 0.9);
    let agent = agent_with(
        &[city_graph(), move_car_graph()],
        basic_collaborators(interp),
    );

    agent
        .handle_message(TurnRequest::new("s1", "订酒店"))
        .await
        .unwrap();
    let pack = agent
        .handle_message(TurnRequest::new("s1", "帮我挪一下车"))
        .await
        .unwrap();
    // Not an option, but it triggers the move-car graph's start predicate.
    assert_eq!(pack.says, "请问您的车牌号是多少？");
    assert_eq!(pack.dialog.unwrap().graph_id, "g_move_car");
}

fn rpc_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_bill",
        "name": "账单查询",
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "query_bill"}]]
            },
            {
                "node_id": "n_rpc",
                "node_type": "rpc",
                "method": "post",
                "url": "http://billing.internal/query",
                "params": {"user": "${params.user_id}"},
                "slots": [{"slot_name": "bill_amount", "response_field": "amount"}]
            },
            {"node_id": "n_done", "node_type": "say", "content": ["您的账单金额为${slot.bill_amount}元"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_rpc"},
            {"line_id": "l2", "source_id": "n_rpc", "target_id": "n_done"}
        ]
    }))
}

#[tokio::test]
async fn rpc_repeat_is_bounded_to_two_calls() {
    let interp = FakeInterpreter::new().intent("查账单", "query_bill", 0.9);
    let rpc = Arc::new(FakeRpc::new(
        json!({"__repeat": true, "answer": "正在为您查询，请稍候", "amount": 42}),
    ));
    let collab = collaborators(
        Arc::new(interp),
        Arc::new(FakeFaq::new("我们聊点别的吧")),
        Arc::new(FakeBank::default()),
        rpc.clone(),
    );
    let agent = agent_with(&[rpc_graph()], collab);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "查账单"))
        .await
        .unwrap();
    assert_eq!(pack.says, "正在为您查询，请稍候");
    assert_eq!(*rpc.calls.lock(), 1);

    // The endpoint still asks to repeat, but the protocol is bounded: the
    // second call finalizes with whatever fields are available.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "好的"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您的账单金额为42元");
    assert_eq!(*rpc.calls.lock(), 2);
}

#[tokio::test]
async fn rpc_not_understood_flags_system_transfer() {
    let interp = FakeInterpreter::new().intent("查账单", "query_bill", 0.9);
    let rpc = Arc::new(FakeRpc::new(json!({"understanding": false, "amount": 7})));
    let collab = collaborators(
        Arc::new(interp),
        Arc::new(FakeFaq::new("我们聊点别的吧")),
        Arc::new(FakeBank::default()),
        rpc,
    );
    let agent = agent_with(&[rpc_graph()], collab);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "查账单"))
        .await
        .unwrap();
    assert_eq!(pack.dialog_status, "11");
    assert!(pack.dialog.unwrap().is_end);
}

fn switch_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_switch",
        "name": "转接",
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [
                    [{"type": "intent", "operator": "==", "value": "i_manual"}],
                    [{"type": "intent", "operator": "==", "value": "i_jump"}]
                ]
            },
            {
                "node_id": "n_manual",
                "node_type": "switch",
                "jump_type": "2",
                "jump_reply": "正在为您转接人工客服"
            },
            {
                "node_id": "n_jump",
                "node_type": "switch",
                "jump_type": "1",
                "graph_id": "g_move_car",
                "jump_reply": "为您转到挪车流程"
            }
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_manual", "intent_id": "i_manual"},
            {"line_id": "l2", "source_id": "n_start", "target_id": "n_jump", "intent_id": "i_jump"}
        ]
    }))
}

#[tokio::test]
async fn switch_manual_marks_user_transfer() {
    let interp = FakeInterpreter::new().intent("转人工", "i_manual", 0.9);
    let agent = agent_with(
        &[switch_graph(), move_car_graph()],
        basic_collaborators(interp),
    );

    let pack = agent
        .handle_message(TurnRequest::new("s1", "转人工"))
        .await
        .unwrap();
    assert_eq!(pack.says, "正在为您转接人工客服");
    // The user asked for a human on purpose.
    assert_eq!(pack.dialog_status, "10");
    assert!(pack.dialog.unwrap().is_end);
}

#[tokio::test]
async fn switch_jumps_into_another_graph() {
    let interp = FakeInterpreter::new().intent("我要挪车流程", "i_jump", 0.9);
    let agent = agent_with(
        &[switch_graph(), move_car_graph()],
        basic_collaborators(interp),
    );

    let pack = agent
        .handle_message(TurnRequest::new("s1", "我要挪车流程"))
        .await
        .unwrap();
    assert_eq!(pack.says, "为您转到挪车流程");

    // The next utterance lands in the target graph.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "好"))
        .await
        .unwrap();
    assert_eq!(pack.says, "请问您的车牌号是多少？");
    assert_eq!(pack.dialog.unwrap().graph_id, "g_move_car");
}

#[tokio::test]
async fn faq_answers_when_nothing_triggers() {
    let interp = FakeInterpreter::new();
    let faq = FakeFaq::new("我们聊点别的吧").answer("什么是年费", "年费说明", "年费是每年收取的服务费用", 0.92);
    let collab = collaborators(
        Arc::new(interp),
        Arc::new(faq),
        Arc::new(FakeBank::default()),
        Arc::new(FakeRpc::default()),
    );
    let agent = agent_with(&[move_car_graph()], collab);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "什么是年费"))
        .await
        .unwrap();
    assert_eq!(pack.reply_type, "1");
    assert_eq!(pack.says, "年费是每年收取的服务费用");
    let faq = pack.faq.unwrap();
    assert_eq!(faq.hit, "年费说明");
    assert!(faq.confidence > 0.9);
}

#[tokio::test]
async fn chitchat_answers_when_faq_misses() {
    let agent = agent_with(
        &[move_car_graph()],
        basic_collaborators(FakeInterpreter::new()),
    );

    let pack = agent
        .handle_message(TurnRequest::new("s1", "今天天气怎么样"))
        .await
        .unwrap();
    assert_eq!(pack.reply_type, "1");
    assert_eq!(pack.says, "我们聊点别的吧");
    assert_eq!(pack.understanding, "3");
}

fn optional_slot_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_paint",
        "name": "喷漆预约",
        "global_slots": {"color": "color_ability"},
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "paint"}]]
            },
            {
                "node_id": "n_fill",
                "node_type": "fill_slots",
                "slots": [{
                    "slot_name": "color",
                    "rounds": 1,
                    "reask_words": ["您想喷什么颜色？"],
                    "is_necessary": false
                }]
            },
            {"node_id": "n_done", "node_type": "say", "content": ["已预约喷漆，颜色：${slot.color}"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_fill"},
            {"line_id": "l2", "source_id": "n_fill", "target_id": "n_done"}
        ]
    }))
}

#[tokio::test]
async fn optional_slot_gives_up_with_unknown_marker() {
    let interp = FakeInterpreter::new().intent("我要喷漆", "paint", 0.9);
    let agent = agent_with(&[optional_slot_graph()], basic_collaborators(interp));

    let pack = agent
        .handle_message(TurnRequest::new("s1", "我要喷漆"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您想喷什么颜色？");

    // Re-asks exhausted on a non-required slot: auto-filled and the flow
    // moves on.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "随便"))
        .await
        .unwrap();
    assert_eq!(pack.says, "已预约喷漆，颜色：unknown");
}

fn cancellable_fill_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_cancel",
        "name": "可取消填槽",
        "global_slots": {"plate_number": "plate"},
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "move_car"}]]
            },
            {
                "node_id": "n_fill",
                "node_type": "fill_slots",
                "slots": [{
                    "slot_name": "plate_number",
                    "rounds": 3,
                    "reask_words": ["请问您的车牌号是多少？"],
                    "is_necessary": true
                }]
            },
            {"node_id": "n_done", "node_type": "say", "content": ["好的"]},
            {"node_id": "n_cancel", "node_type": "say", "content": ["已为您取消挪车"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_fill"},
            {"line_id": "l2", "source_id": "n_fill", "target_id": "n_done"},
            {"line_id": "l3", "source_id": "n_fill", "target_id": "n_cancel", "intent_id": "i_cancel"}
        ]
    }))
}

#[tokio::test]
async fn forced_intent_jumps_out_of_slot_filling() {
    let interp = FakeInterpreter::new()
        .intent("帮我挪一下车", "move_car", 0.9)
        .intent("不用了，取消吧", "i_cancel", 0.9);
    let agent = agent_with(&[cancellable_fill_graph()], basic_collaborators(interp));

    agent
        .handle_message(TurnRequest::new("s1", "帮我挪一下车"))
        .await
        .unwrap();
    let pack = agent
        .handle_message(TurnRequest::new("s1", "不用了，取消吧"))
        .await
        .unwrap();
    assert_eq!(pack.says, "已为您取消挪车");
}

fn survey_graph() -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_survey",
        "name": "问卷",
        "global_params": {"global_question_id": "lib1"},
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "survey"}]]
            },
            {
                "node_id": "n_dyn",
                "node_type": "dynamic",
                "random_mode": 1,
                "qes_id": "q1"
            },
            {"node_id": "n_done", "node_type": "say", "content": ["感谢您参与问卷"]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_dyn"},
            {"line_id": "l2", "source_id": "n_dyn", "target_id": "n_done"}
        ]
    }))
}

#[tokio::test]
async fn dynamic_node_recurses_into_matched_sub_question() {
    use xdialogue::faq::{IntentItem, QuestionItem};

    let interp = FakeInterpreter::new().intent("做个问卷", "survey", 0.9);
    let bank = FakeBank {
        questions: vec![
            QuestionItem {
                id: "q1".to_string(),
                content: "您对我们的服务满意吗？".to_string(),
                intent_ids: vec!["i_unhappy".to_string()],
                child_ids: vec!["q2".to_string()],
                parent_intent_id: None,
                slot_bindings: vec![],
            },
            QuestionItem {
                id: "q2".to_string(),
                content: "哪里让您不满意？".to_string(),
                intent_ids: vec![],
                child_ids: vec![],
                parent_intent_id: Some("i_unhappy".to_string()),
                slot_bindings: vec![],
            },
        ],
        intents: vec![IntentItem {
            intent_id: "i_unhappy".to_string(),
            intent_name: "不满意".to_string(),
            examples: vec![],
            rules: vec!["不满意".to_string()],
        }],
    };
    let collab = collaborators(
        Arc::new(interp),
        Arc::new(FakeFaq::new("我们聊点别的吧")),
        Arc::new(bank),
        Arc::new(FakeRpc::default()),
    );
    let agent = agent_with(&[survey_graph()], collab);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "做个问卷"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您对我们的服务满意吗？");

    // The regex rule matches → recurse into the sub-question.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "不满意"))
        .await
        .unwrap();
    assert_eq!(pack.says, "哪里让您不满意？");

    // No follow-up intent on the sub-question → forward to the default child.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "响应太慢了"))
        .await
        .unwrap();
    assert_eq!(pack.says, "感谢您参与问卷");
}
