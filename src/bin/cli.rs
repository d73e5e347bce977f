use clap::{App, Arg, ArgMatches, SubCommand};
use renoir_runtime::{
    channel::{UnixConnector, DEFAULT_RUNTIME_DIR},
    config::BROKER_CHANNEL_NAME,
    runtime::{self, DefaultRuntimeFactory, Runtime},
    Result, RuntimeConfig, RuntimeError, ServiceDescription,
};
use std::{sync::Arc, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();

    let service_arg = || {
        Arg::with_name("service")
            .value_name("SERVICE/INSTANCE/EVENT")
            .help("Service description, e.g. Radar/Front/Distance")
            .required(true)
            .index(1)
    };

    let matches = App::new("renoir-runtime")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Renoir Runtime CLI Tool")
        .arg(
            Arg::with_name("name")
                .short("n")
                .long("name")
                .value_name("NAME")
                .help("Application name, with leading '/'")
                .default_value("/renoir-runtime-cli")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("runtime_dir")
                .short("d")
                .long("runtime-dir")
                .value_name("DIR")
                .help("Directory holding the broker and application sockets")
                .default_value(DEFAULT_RUNTIME_DIR)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("broker")
                .short("b")
                .long("broker")
                .value_name("CHANNEL")
                .help("Broker channel name")
                .default_value(BROKER_CHANNEL_NAME)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("wait")
                .short("w")
                .long("wait")
                .value_name("SECONDS")
                .help("How long to wait for the broker")
                .default_value("5")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("find")
                .about("List instances offering a service")
                .arg(service_arg()),
        )
        .subcommand(
            SubCommand::with_name("offer")
                .about("Offer a service")
                .arg(service_arg()),
        )
        .subcommand(
            SubCommand::with_name("stop-offer")
                .about("Stop offering a service")
                .arg(service_arg()),
        )
        .subcommand(
            SubCommand::with_name("counter")
                .about("Print the service registry change counter"),
        )
        .subcommand(
            SubCommand::with_name("keepalive")
                .about("Stay registered and send heartbeats for a while")
                .arg(
                    Arg::with_name("duration")
                        .short("t")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("How long to stay alive")
                        .default_value("10")
                        .takes_value(true),
                ),
        )
        .get_matches();

    if matches.subcommand_name().is_none() {
        println!("Use --help for usage information");
        return Ok(());
    }

    let runtime = connect(&matches)?;

    match matches.subcommand() {
        ("find", Some(find_matches)) => {
            let service = parse_service(find_matches)?;
            let instances = runtime.find_service(&service);
            if instances.is_empty() {
                println!("No instances of {} found", service);
            } else {
                println!("Instances of {}:", service);
                for instance in instances {
                    println!("  - {}", instance);
                }
            }
        }
        ("offer", Some(offer_matches)) => {
            let service = parse_service(offer_matches)?;
            report("Offer", &service, runtime.offer_service(&service));
        }
        ("stop-offer", Some(stop_matches)) => {
            let service = parse_service(stop_matches)?;
            report("Stop offer", &service, runtime.stop_offer_service(&service));
        }
        ("counter", Some(_)) => match runtime.service_registry_change_counter() {
            Some(counter) => println!("Service registry change counter: {}", counter.value()),
            None => println!("Broker did not provide a change counter"),
        },
        ("keepalive", Some(keepalive_matches)) => {
            let seconds = parse_u64(keepalive_matches, "duration")?;
            println!("Keeping {} alive for {}s...", runtime.name(), seconds);
            thread::sleep(Duration::from_secs(seconds));
        }
        _ => println!("Use --help for usage information"),
    }

    println!("\nStats: {}", runtime.stats().summary());
    Ok(())
}

fn connect(matches: &ArgMatches) -> Result<Arc<Runtime>> {
    let name = matches.value_of("name").unwrap_or_default();
    let runtime_dir = matches.value_of("runtime_dir").unwrap_or(DEFAULT_RUNTIME_DIR);
    let broker = matches.value_of("broker").unwrap_or(BROKER_CHANNEL_NAME);
    let wait = Duration::from_secs(parse_u64(matches, "wait")?);

    let config = RuntimeConfig::new().with_broker_wait_timeout(wait);
    let connector = UnixConnector::new(runtime_dir).with_broker_name(broker);
    runtime::install_factory(Box::new(DefaultRuntimeFactory::new(config, connector)))?;

    runtime::try_instance(name)
}

fn parse_service(matches: &ArgMatches) -> Result<ServiceDescription> {
    matches.value_of("service").unwrap_or_default().parse()
}

fn parse_u64(matches: &ArgMatches, arg: &str) -> Result<u64> {
    matches
        .value_of(arg)
        .unwrap_or_default()
        .parse()
        .map_err(|_| RuntimeError::invalid_parameter(arg, "Expected a whole number"))
}

fn report(action: &str, service: &ServiceDescription, queued: bool) {
    if queued {
        println!("{} of {} queued for the broker", action, service);
    } else {
        println!("{} of {} failed, see log", action, service);
    }
}
