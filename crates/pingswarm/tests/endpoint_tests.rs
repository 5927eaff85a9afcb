use pingswarm::{Endpoint, EndpointAllocator};
use pingswarm_common::TargetConfig;

#[test]
fn two_servers_four_workers_alternate_ports() {
    let mut allocator = EndpointAllocator::new("10.0.0.1", 9000, 2);
    let ports: Vec<u16> = (0..4).map(|_| allocator.next().port).collect();
    assert_eq!(ports, vec![9000, 9001, 9000, 9001]);
}

#[test]
fn single_server_always_returns_base_port() {
    let mut allocator = EndpointAllocator::new("localhost", 7000, 1);
    for _ in 0..5 {
        assert_eq!(allocator.next(), Endpoint::new("localhost", 7000));
    }
}

#[test]
fn sequence_matches_index_modulo_server_count() {
    for servers in 1..=7u32 {
        let mut allocator = EndpointAllocator::new("h", 20000, servers);
        for i in 0..25usize {
            let expected = 20000 + (i as u32 % servers) as u16;
            let next = allocator.next();
            assert_eq!(next.port, expected, "servers={} worker={}", servers, i);
            assert_eq!(allocator.endpoint_for(i), next);
        }
    }
}

#[test]
fn wraps_at_top_of_port_range() {
    let mut allocator = EndpointAllocator::new("h", 65534, 2);
    let ports: Vec<u16> = (0..5).map(|_| allocator.next().port).collect();
    assert_eq!(ports, vec![65534, 65535, 65534, 65535, 65534]);
}

#[test]
fn from_config_uses_target_section() {
    let target = TargetConfig {
        host: "192.168.1.5".to_string(),
        base_port: 5000,
        server_count: 3,
    };
    let mut allocator = EndpointAllocator::from_config(&target);
    assert_eq!(allocator.next(), Endpoint::new("192.168.1.5", 5000));
    assert_eq!(allocator.next(), Endpoint::new("192.168.1.5", 5001));
    assert_eq!(allocator.next(), Endpoint::new("192.168.1.5", 5002));
    assert_eq!(allocator.next(), Endpoint::new("192.168.1.5", 5000));
}

#[test]
fn endpoint_display_brackets_ipv6_hosts() {
    assert_eq!(Endpoint::new("127.0.0.1", 80).to_string(), "127.0.0.1:80");
    assert_eq!(Endpoint::new("::1", 8080).to_string(), "[::1]:8080");
}
