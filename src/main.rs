use chrono::Local;
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use goplus_client::{
    config::Config,
    events::{AppEvent, EventBus},
    external::StarShareApi,
    models::{Order, OutcomeStatus, RechargeOutcome},
    services::{DebouncedValidator, RechargeWizard, WizardState},
    storage::{CredentialStore, FileStore, StoredCredentials},
};

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stderr)
        .init();

    // 加载配置
    let config = Config::from_toml()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration file: {e}"))?;

    let bus = EventBus::default();
    let store = FileStore::new(&config.storage.credentials_path);

    // 登录态失效统一在这里处理：清掉本地凭证并提示重新登录
    {
        let mut rx = bus.subscribe();
        let store = store.clone();
        tokio::spawn(async move {
            while let Ok(AppEvent::AuthFailure { reason }) = rx.recv().await {
                log::warn!("Auth failure ({reason}), clearing stored credentials");
                if let Err(e) = store.clear() {
                    log::error!("Failed to clear credentials: {e}");
                }
                eprintln!("登录态已失效（{reason}），请重新登录后再试。");
            }
        });
    }

    let stored = store.load().unwrap_or_else(|e| {
        log::warn!("Failed to load stored credentials: {e}");
        None
    });
    let auth_token = stored.as_ref().and_then(|c| c.auth_token.clone());

    let api = StarShareApi::new(&config.api, bus.clone()).with_token(auth_token);
    let mut wizard = RechargeWizard::new(api, config.wizard.clone());
    let debounce = Duration::from_millis(config.wizard.debounce_ms);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("=== Star Share · ChatGPT Plus 充值向导 ===");

    loop {
        // 第一步：会话 JSON
        let session_raw = read_session_json(&mut lines, debounce, stored.as_ref(), &mut wizard)
            .await?;
        if let Err(e) = store.save(&StoredCredentials {
            auth_token: stored.as_ref().and_then(|c| c.auth_token.clone()),
            session_json: Some(session_raw),
        }) {
            log::warn!("Failed to persist session credential: {e}");
        }

        // 第二步：选择支付或 CDK
        let use_cdk = if wizard.cdk_enabled() {
            println!("\n[1] 扫码支付   [2] 使用 CDK 兑换码");
            print_prompt("请选择: ")?;
            matches!(next_line(&mut lines).await?.trim(), "2")
        } else {
            false
        };

        if use_cdk {
            run_cdk_entry(&mut lines, &mut wizard).await?;
        } else {
            run_order_entry(&mut lines, &mut wizard).await?;
        }

        print_prompt("\n再来一次？(y/N): ")?;
        if !next_line(&mut lines).await?.trim().eq_ignore_ascii_case("y") {
            break;
        }
        wizard.reset();
        println!();
    }

    Ok(())
}

/// 读取并校验会话 JSON，直到通过为止。
/// 输入按行喂给防抖校验器，空行表示本次粘贴结束。
async fn read_session_json(
    lines: &mut StdinLines,
    debounce: Duration,
    stored: Option<&StoredCredentials>,
    wizard: &mut RechargeWizard<StarShareApi>,
) -> anyhow::Result<String> {
    if let Some(saved) = stored.and_then(|c| c.session_json.as_deref()) {
        if wizard.submit_session(saved).has_all_fields {
            print_prompt("检测到上次保存的会话凭证，直接使用？(Y/n): ")?;
            if !next_line(lines).await?.trim().eq_ignore_ascii_case("n") {
                return Ok(saved.to_string());
            }
            wizard.reset();
        }
    }

    loop {
        println!("\n请粘贴 ChatGPT 会话 JSON（空行结束）:");
        let mut validator = DebouncedValidator::new(debounce);
        let mut buffer = String::new();
        loop {
            let line = next_line(lines).await?;
            if line.trim().is_empty() {
                break;
            }
            buffer.push_str(&line);
            buffer.push('\n');
            validator.input(&buffer);
        }

        if buffer.trim().is_empty() {
            println!("未输入任何内容。");
            continue;
        }

        let validation = validator.settled().await;
        if !validation.has_all_fields {
            println!("校验未通过: {}", validation.error_message);
            continue;
        }

        // settled 的是同一份 buffer，这里必然通过
        wizard.submit_session(&buffer);
        println!("会话凭证校验通过。");
        return Ok(buffer);
    }
}

/// 订单路径：下单、展示二维码、倒计时轮询，必要时回落到 CDK
async fn run_order_entry(
    lines: &mut StdinLines,
    wizard: &mut RechargeWizard<StarShareApi>,
) -> anyhow::Result<()> {
    match wizard.create_order().await {
        Ok(order) => print_order(order),
        Err(e) => {
            println!("创建订单失败: {e}，请稍后重试。");
            return Ok(());
        }
    }

    if wizard.cdk_enabled() {
        println!("等待支付期间可直接输入 CDK 兑换码改走兑换，输入 q 取消。");
    } else {
        println!("等待支付期间输入 q 可取消。");
    }

    // 倒计时、轮询和键盘输入并行跑；QrExpiry 的剩余值每秒从截止时刻重新算
    let expiry = wizard.qr_expiry().cloned();
    let cancel = wizard.cancel_handle();
    let mut pending_cdk: Option<String> = None;
    let mut user_quit = false;
    {
        let payment = wizard.run_payment();
        tokio::pin!(payment);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                result = &mut payment => {
                    result?;
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(expiry) = &expiry {
                        print_prompt(&format!("\r二维码剩余有效时间: {:>3} 秒 ", expiry.remaining_seconds()))?;
                    }
                }
                line = lines.next_line() => {
                    let input = line?.unwrap_or_default().trim().to_string();
                    if input.eq_ignore_ascii_case("q") {
                        user_quit = true;
                        cancel.cancel();
                    } else if !input.is_empty() {
                        // CDK 提交要等轮询停下释放向导，先把码记下来
                        pending_cdk = Some(input);
                        cancel.cancel();
                    }
                }
            }
        }
        println!();
    }

    match wizard.state() {
        WizardState::Success { outcome } => print_outcome(outcome),
        WizardState::Error { outcome } => {
            print_outcome(outcome);
            if wizard.cdk_enabled() {
                println!("支付路径失败后仍可使用 CDK 兑换。");
                run_cdk_entry(lines, wizard).await?;
            }
        }
        WizardState::Expired => {
            println!("二维码已过期（未支付）。过期不等于失败，重新开始即可再次下单。");
        }
        WizardState::Payment { .. } => {
            // 轮询被取消：要么改走 CDK，要么整体放弃
            if let Some(code) = pending_cdk {
                if wizard.cdk_enabled() {
                    if !submit_cdk_code(wizard, &code).await? {
                        run_cdk_entry(lines, wizard).await?;
                    }
                } else {
                    println!("CDK 兑换未开放。");
                    wizard.reset();
                }
            } else if user_quit {
                wizard.reset();
                println!("已取消本次支付。");
            }
        }
        other => println!("流程结束于状态: {}", other.name()),
    }
    Ok(())
}

/// CDK 路径：跳过订单与支付
async fn run_cdk_entry(
    lines: &mut StdinLines,
    wizard: &mut RechargeWizard<StarShareApi>,
) -> anyhow::Result<()> {
    loop {
        print_prompt("请输入 CDK 兑换码（留空放弃）: ")?;
        let code = next_line(lines).await?;
        if code.trim().is_empty() {
            return Ok(());
        }

        if submit_cdk_code(wizard, &code).await? {
            return Ok(());
        }
        // 失败后允许换一个码再试
    }
}

/// 提交单个 CDK 码；返回 true 表示流程已收场（成功或放弃）
async fn submit_cdk_code(
    wizard: &mut RechargeWizard<StarShareApi>,
    code: &str,
) -> anyhow::Result<bool> {
    match wizard.submit_cdk(code).await {
        Ok(WizardState::Success { outcome }) => {
            print_outcome(outcome);
            Ok(true)
        }
        Ok(WizardState::Error { outcome }) => {
            print_outcome(outcome);
            Ok(false)
        }
        Ok(other) => {
            println!("流程结束于状态: {}", other.name());
            Ok(true)
        }
        Err(e) => {
            println!("无法提交: {e}");
            Ok(false)
        }
    }
}

fn print_order(order: &Order) {
    println!("\n订单创建成功:");
    println!("  套餐:     {}", order.package_name);
    println!("  金额:     {:.2} 元", order.price);
    println!("  支付方式: {} ({})", order.pay_type, order.channel);
    println!("  订单号:   {} / {}", order.order_id, order.trade_no);
    println!("  二维码内容（请用支付 App 扫码或自行生成二维码）:");
    println!("    {}", order.qr_code);
    if let Some(url) = &order.payment_url {
        println!("  或直接打开支付链接: {url}");
    }
}

fn print_outcome(outcome: &RechargeOutcome) {
    match outcome.status {
        OutcomeStatus::Success => println!("\n✔ {}", outcome.message),
        _ => {
            println!("\n✘ {}", outcome.message);
            if let Some(raw) = &outcome.raw_response {
                // 后端没有结构化错误码，原始响应直接给用户拿去找客服
                println!("原始响应（联系客服时请附上截图）:");
                println!("{}", serde_json::to_string_pretty(raw).unwrap_or_default());
            }
        }
    }
}

async fn next_line(lines: &mut StdinLines) -> anyhow::Result<String> {
    Ok(lines.next_line().await?.unwrap_or_default())
}

fn print_prompt(text: &str) -> anyhow::Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}
