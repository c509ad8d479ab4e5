//! `ca-cli doctor` — sanity-checks a configuration without running a
//! turn. Grounded on the gateway's own doctor command: one check per
//! config concern, PASS/FAIL printed as it goes, overall exit status
//! reflects whether anything failed.

use ca_domain::config::Config;
use ca_providers::ProviderRegistry;

pub fn run(config: &Config, config_path: &str) -> bool {
    println!("ca-cli doctor");
    println!("=============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_providers(config, &mut all_passed);
    check_roles(config, &mut all_passed);
    check_rooms_and_agents(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    all_passed
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists { config_path.to_owned() } else { format!("{config_path} not found (using defaults)") },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_providers(config: &Config, all_passed: &mut bool) {
    if config.llm.providers.is_empty() {
        print_check("LLM providers configured", false, "no providers in llm.providers".into());
        *all_passed = false;
        return;
    }

    match ProviderRegistry::from_config(&config.llm) {
        Ok(_) => print_check(
            "LLM providers configured",
            true,
            format!("{} provider(s) constructed", config.llm.providers.len()),
        ),
        Err(e) => {
            print_check("LLM providers configured", false, e.to_string());
            *all_passed = false;
        }
    }
}

fn check_roles(config: &Config, all_passed: &mut bool) {
    let passed = !config.llm.roles.is_empty();
    print_check(
        "Model role aliases configured",
        passed,
        if passed { format!("{} role(s)", config.llm.roles.len()) } else { "no roles in llm.roles".into() },
    );
    if !passed {
        *all_passed = false;
    }
}

fn check_rooms_and_agents(config: &Config, all_passed: &mut bool) {
    let passed = !config.agents.is_empty();
    print_check(
        "Agents configured",
        passed,
        if passed { format!("{} agent(s), {} room(s)", config.agents.len(), config.rooms.len()) } else { "no agents in config.agents".into() },
    );
    if !passed {
        *all_passed = false;
    }

    for (room_key, room) in &config.rooms {
        for agent_key in &room.agent_keys {
            if !config.agents.contains_key(agent_key) {
                print_check(
                    &format!("Room '{room_key}' agent references"),
                    false,
                    format!("agent key '{agent_key}' is not defined in config.agents"),
                );
                *all_passed = false;
            }
        }
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
